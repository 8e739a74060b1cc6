//! Unit tests for the artefact packaging module.

use super::*;
use flate2::read::GzDecoder;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("temp dir creation succeeds")
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::try_from(path.to_path_buf()).expect("UTF-8 temp path")
}

fn write(root: &Utf8Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write fixture file");
}

/// A pilet root with a bundle, sources, and clutter that must not be packed.
fn sample_pilet(temp_dir: &TempDir, manifest: &str) -> Utf8PathBuf {
    let root = utf8(temp_dir.path()).join("pilet");
    write(&root, "package.json", manifest);
    write(&root, "dist/index.js", "export default {};");
    write(&root, "dist/index.d.ts", "export {};");
    write(&root, "src/index.tsx", "export function setup() {}");
    write(&root, "node_modules/react/index.js", "module.exports = {};");
    write(&root, ".git/HEAD", "ref: refs/heads/main");
    write(&root, "old-1.0.0.tgz", "stale");
    root
}

fn list_archive_entries(path: &Utf8Path) -> Vec<(String, u32)> {
    let file = fs::File::open(path).expect("open archive");
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .entries()
        .expect("read entries")
        .map(|entry| {
            let entry = entry.expect("valid entry");
            let name = entry.path().expect("entry path").display().to_string();
            let mode = entry.header().mode().expect("entry mode");
            (name, mode)
        })
        .collect()
}

fn names(entries: &[(String, u32)]) -> Vec<&str> {
    entries.iter().map(|(name, _)| name.as_str()).collect()
}

#[rstest]
fn compute_sha256_of_known_content(temp_dir: TempDir) {
    let path = utf8(temp_dir.path()).join("empty.bin");
    // SHA-256 of empty file is the well-known constant.
    fs::write(&path, b"").expect("write");
    let digest = compute_sha256(&path).expect("sha256 succeeds");
    assert_eq!(
        digest,
        concat!(
            "e3b0c44298fc1c149afbf4c8996fb924",
            "27ae41e4649b934ca495991b7852b855"
        )
    );
}

#[rstest]
fn pack_skips_dependencies_vcs_and_old_archives(temp_dir: TempDir) {
    let root = sample_pilet(&temp_dir, r#"{"name":"cart","version":"1.0.0"}"#);
    let out = utf8(temp_dir.path()).join("out");

    let output = pack(&root, &out).expect("pack succeeds");

    assert_eq!(output.archive_path, out.join("cart-1.0.0.tgz"));
    assert_eq!(output.file_count, 4);
    let entries = list_archive_entries(&output.archive_path);
    assert_eq!(
        names(&entries),
        vec![
            "package/dist/index.d.ts",
            "package/dist/index.js",
            "package/package.json",
            "package/src/index.tsx",
        ]
    );
}

#[rstest]
fn pack_honours_files_list(temp_dir: TempDir) {
    let root = sample_pilet(
        &temp_dir,
        r#"{"name":"@acme/cart","version":"2.1.0","files":["dist/*.js","README.md"]}"#,
    );
    write(&root, "README.md", "# cart");
    let out = utf8(temp_dir.path()).join("out");

    let output = pack(&root, &out).expect("pack succeeds");

    assert_eq!(output.archive_path, out.join("acme-cart-2.1.0.tgz"));
    let entries = list_archive_entries(&output.archive_path);
    assert_eq!(
        names(&entries),
        vec![
            "package/README.md",
            "package/dist/index.js",
            "package/package.json",
        ]
    );
}

#[rstest]
fn pack_is_byte_identical_across_runs(temp_dir: TempDir) {
    let root = sample_pilet(&temp_dir, r#"{"name":"cart","version":"1.0.0"}"#);
    let first = pack(&root, &utf8(temp_dir.path()).join("first")).expect("first pack");
    let second = pack(&root, &utf8(temp_dir.path()).join("second")).expect("second pack");

    let first_bytes = fs::read(&first.archive_path).expect("read first");
    let second_bytes = fs::read(&second.archive_path).expect("read second");
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first.sha256, second.sha256);
}

#[rstest]
fn pack_normalises_entry_metadata(temp_dir: TempDir) {
    let root = sample_pilet(&temp_dir, r#"{"name":"cart","version":"1.0.0"}"#);
    let output = pack(&root, &utf8(temp_dir.path()).join("out")).expect("pack succeeds");

    let file = fs::File::open(&output.archive_path).expect("open archive");
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive.entries().expect("read entries") {
        let entry = entry.expect("valid entry");
        let header = entry.header();
        assert_eq!(header.mtime().expect("mtime"), 0);
        assert_eq!(header.uid().expect("uid"), 0);
        assert_eq!(header.gid().expect("gid"), 0);
    }
}

#[cfg(unix)]
#[rstest]
fn pack_preserves_executable_bit_only(temp_dir: TempDir) {
    use std::os::unix::fs::PermissionsExt;

    let root = sample_pilet(&temp_dir, r#"{"name":"cart","version":"1.0.0"}"#);
    write(&root, "bin/cli.js", "#!/usr/bin/env node");
    fs::set_permissions(root.join("bin/cli.js"), fs::Permissions::from_mode(0o750))
        .expect("chmod");
    fs::set_permissions(root.join("src/index.tsx"), fs::Permissions::from_mode(0o600))
        .expect("chmod");

    let output = pack(&root, &utf8(temp_dir.path()).join("out")).expect("pack succeeds");
    let entries = list_archive_entries(&output.archive_path);
    let mode_of = |name: &str| {
        entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, mode)| *mode)
    };
    assert_eq!(mode_of("package/bin/cli.js"), Some(0o755));
    assert_eq!(mode_of("package/src/index.tsx"), Some(0o644));
}

#[rstest]
fn pack_rejects_missing_root(temp_dir: TempDir) {
    let root = utf8(temp_dir.path()).join("absent");
    let err = pack(&root, &utf8(temp_dir.path())).expect_err("root missing");
    assert!(matches!(err, PackagingError::RootMissing(_)));
}

#[rstest]
fn pack_requires_manifest(temp_dir: TempDir) {
    let root = utf8(temp_dir.path()).join("pilet");
    write(&root, "dist/index.js", "export default {};");
    let err = pack(&root, &utf8(temp_dir.path())).expect_err("manifest missing");
    assert!(matches!(err, PackagingError::Manifest(_)));
}

#[rstest]
fn files_list_cannot_escape_root(temp_dir: TempDir) {
    let root = sample_pilet(
        &temp_dir,
        r#"{"name":"cart","version":"1.0.0","files":["../outside.txt"]}"#,
    );
    write(&utf8(temp_dir.path()), "outside.txt", "secret");
    let manifest = PackageManifest::read(&root).expect("manifest");

    let err = collect_entries(&root, &manifest).expect_err("outside root");
    assert!(matches!(err, PackagingError::OutsideRoot(_)));
}

#[rstest]
fn malformed_files_glob_is_a_pattern_error(temp_dir: TempDir) {
    let root = sample_pilet(
        &temp_dir,
        r#"{"name":"cart","version":"1.0.0","files":["dist/[bad"]}"#,
    );
    let manifest = PackageManifest::read(&root).expect("manifest");

    let err = collect_entries(&root, &manifest).expect_err("bad glob");
    assert!(matches!(err, PackagingError::InvalidPattern { ref pattern, .. } if pattern == "dist/[bad"));
}

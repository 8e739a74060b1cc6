//! Deterministic pilet packing.
//!
//! Creates npm-style `.tgz` archives from a pilet root. Every entry lives
//! under `package/`, entries are sorted, and timestamps, ownership and modes
//! are normalised so packing an unchanged tree twice yields identical bytes.

use super::manifest::{MANIFEST_FILE, PackageManifest};
use super::packaging_error::PackagingError;
use super::source::glob_in;
use crate::error::PublishError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use walkdir::{DirEntry, WalkDir};

/// Directory prefix of every archive entry.
const ARCHIVE_PREFIX: &str = "package";

/// Names never packed when the manifest has no `files` list.
const EXCLUDED_NAMES: [&str; 2] = ["node_modules", ".git"];

/// One file to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    /// File on disk.
    pub source: Utf8PathBuf,
    /// Path inside the archive, relative to `package/`, `/`-separated.
    pub archive_name: String,
    /// Whether the file is stored with mode `0755`.
    pub executable: bool,
}

/// Output produced by [`pack`].
#[derive(Debug)]
pub struct PackOutput {
    /// Path to the created `.tgz` archive.
    pub archive_path: Utf8PathBuf,
    /// Lowercase hex SHA-256 of the archive.
    pub sha256: String,
    /// Number of files packed.
    pub file_count: usize,
    /// The manifest the archive was named from.
    pub manifest: PackageManifest,
}

/// Compute the SHA-256 digest of a file.
///
/// Reads the file at `path` in chunks and returns the lowercase hex digest.
///
/// # Errors
///
/// Returns [`PackagingError::Io`] if the file cannot be read.
pub fn compute_sha256(path: &Utf8Path) -> Result<String, PackagingError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Pack the pilet at `root` into `<output_dir>/<scope>-<name>-<version>.tgz`.
///
/// # Errors
///
/// Returns [`PackagingError::RootMissing`] when `root` is not a directory,
/// [`PackagingError::Manifest`] when its `package.json` is unusable, or an
/// I/O error while walking the tree or writing the archive.
pub fn pack(root: &Utf8Path, output_dir: &Utf8Path) -> Result<PackOutput, PackagingError> {
    if !root.is_dir() {
        return Err(PackagingError::RootMissing(root.to_path_buf()));
    }
    let manifest = PackageManifest::read(root)?;
    let entries = collect_entries(root, &manifest)?;

    fs::create_dir_all(output_dir)?;
    let archive_path = output_dir.join(manifest.archive_name());
    create_archive(&archive_path, &entries)?;
    let sha256 = compute_sha256(&archive_path)?;

    log::debug!(
        "packed {} file(s) from {root} into {archive_path} (sha256 {sha256})",
        entries.len()
    );
    Ok(PackOutput {
        archive_path,
        sha256,
        file_count: entries.len(),
        manifest,
    })
}

/// Select the files to pack, sorted by archive name.
///
/// With a `files` list, each item is taken as a file, a directory (packed
/// recursively), or a glob relative to `root`; `package.json` is always
/// added. Without one, the whole root is packed except `node_modules`, `.git`
/// and existing `.tgz` archives.
///
/// # Errors
///
/// Returns [`PackagingError::InvalidPattern`] for a malformed `files` glob, or
/// an I/O or walk error.
pub fn collect_entries(
    root: &Utf8Path,
    manifest: &PackageManifest,
) -> Result<Vec<PackEntry>, PackagingError> {
    let mut entries = BTreeMap::new();

    match &manifest.files {
        Some(files) => {
            add_file(root, &root.join(MANIFEST_FILE), &mut entries)?;
            for item in files {
                let item = item.trim_start_matches("./");
                let candidate = root.join(item);
                if candidate.is_dir() {
                    walk_into(root, &candidate, false, &mut entries)?;
                } else if candidate.is_file() {
                    add_file(root, &candidate, &mut entries)?;
                } else {
                    let matches = glob_in(root, item).map_err(files_glob_error)?;
                    for path in matches {
                        if path.is_dir() {
                            walk_into(root, &path, false, &mut entries)?;
                        } else {
                            add_file(root, &path, &mut entries)?;
                        }
                    }
                }
            }
        }
        None => walk_into(root, root, true, &mut entries)?,
    }

    Ok(entries.into_values().collect())
}

/// Recast a `files` glob failure as a packaging error.
fn files_glob_error(error: PublishError) -> PackagingError {
    match error {
        PublishError::InvalidPattern { pattern, reason } => {
            PackagingError::InvalidPattern { pattern, reason }
        }
        PublishError::SourceUnreadable { source, .. } | PublishError::Io(source) => {
            PackagingError::Io(source)
        }
        other => PackagingError::Io(std::io::Error::other(other.to_string())),
    }
}

/// Write `entries` as a gzip-compressed tar at `output_path`.
///
/// # Errors
///
/// Returns [`PackagingError::Io`] if any source file cannot be read or the
/// output file cannot be written.
pub fn create_archive(output_path: &Utf8Path, entries: &[PackEntry]) -> Result<(), PackagingError> {
    let output_file = fs::File::create(output_path)?;
    let encoder = GzEncoder::new(output_file, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for entry in entries {
        let contents = fs::read(&entry.source)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(if entry.executable { 0o755 } else { 0o644 });
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        archive.append_data(
            &mut header,
            format!("{ARCHIVE_PREFIX}/{}", entry.archive_name),
            contents.as_slice(),
        )?;
    }

    archive.into_inner()?.finish()?;
    Ok(())
}

fn walk_into(
    root: &Utf8Path,
    dir: &Utf8Path,
    apply_excludes: bool,
    entries: &mut BTreeMap<String, PackEntry>,
) -> Result<(), PackagingError> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !apply_excludes || !is_excluded(entry));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path())
            .map_err(PackagingError::NonUtf8Path)?;
        add_file(root, &path, entries)?;
    }
    Ok(())
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return entry.depth() > 0 && EXCLUDED_NAMES.contains(&name.as_ref());
    }
    Utf8Path::new(name.as_ref()).extension() == Some("tgz")
}

fn add_file(
    root: &Utf8Path,
    path: &Utf8Path,
    entries: &mut BTreeMap<String, PackEntry>,
) -> Result<(), PackagingError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PackagingError::OutsideRoot(path.to_path_buf()))?;
    if relative
        .components()
        .any(|component| matches!(component, Utf8Component::ParentDir))
    {
        return Err(PackagingError::OutsideRoot(path.to_path_buf()));
    }
    let archive_name = relative
        .components()
        .map(|component| component.as_str())
        .collect::<Vec<_>>()
        .join("/");
    let executable = is_executable(path)?;
    entries.insert(
        archive_name.clone(),
        PackEntry {
            source: path.to_path_buf(),
            archive_name,
            executable,
        },
    );
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> Result<bool, PackagingError> {
    use std::os::unix::fs::PermissionsExt;

    Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> Result<bool, PackagingError> {
    fs::metadata(path)?;
    Ok(false)
}

#[cfg(test)]
#[path = "packaging_tests.rs"]
mod tests;

//! Tests for publisher CLI parsing and default behaviours.

use super::*;
use crate::hooks::HookPoint;
use clap::CommandFactory;
use rstest::rstest;

fn parse(argv: &[&str]) -> PublishArgs {
    let cli = temp_env::with_vars_unset(["PILET_FEED_URL", "PILET_API_KEY"], || {
        Cli::try_parse_from(argv).expect("arguments parse")
    });
    let Command::Publish(args) = cli.command;
    args
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_defaults() {
    let args = parse(&["pilet-publish", "publish"]);
    assert!(args.sources.is_empty());
    assert_eq!(args.from, SourceKind::Local);
    assert!(!args.fresh);
    assert!(args.url.is_none());
    assert!(args.api_key.is_none());
    assert_eq!(args.auth, AuthScheme::Basic);
    assert!(args.ca_cert.is_none());
    assert!(args.field.is_empty());
    assert!(args.header.is_empty());
    assert!(!args.interactive);
    assert!(args.base_dir.is_none());
    assert_eq!(args.registry, DEFAULT_REGISTRY);
    assert_eq!(args.bundler, DEFAULT_BUNDLER);
    assert!(args.hook.is_empty());
    assert!(!args.quiet);
}

#[test]
fn cli_parses_upload_options() {
    let args = parse(&[
        "pilet-publish",
        "publish",
        "dist/*.tgz",
        "--url",
        "https://feed.example/api",
        "--api-key",
        "k3y",
        "--auth",
        "Bearer",
        "--ca-cert",
        "certs/ca.pem",
        "--field",
        "tag=beta",
        "--header",
        "X-Team=core=1",
        "-q",
    ]);
    assert_eq!(args.sources, vec!["dist/*.tgz"]);
    assert_eq!(args.url.as_deref(), Some("https://feed.example/api"));
    assert_eq!(args.api_key.as_deref(), Some("k3y"));
    assert_eq!(args.auth, AuthScheme::Bearer);
    assert_eq!(args.ca_cert, Some(Utf8PathBuf::from("certs/ca.pem")));
    assert_eq!(args.field, vec![("tag".to_owned(), "beta".to_owned())]);
    assert_eq!(args.header, vec![("X-Team".to_owned(), "core=1".to_owned())]);
    assert!(args.quiet);
}

#[rstest]
#[case("remote", SourceKind::Remote)]
#[case("npm", SourceKind::Npm)]
#[case("local", SourceKind::Local)]
fn cli_parses_source_kind(#[case] value: &str, #[case] expected: SourceKind) {
    let args = parse(&["pilet-publish", "publish", "--from", value, "x"]);
    assert_eq!(args.from, expected);
}

#[test]
fn cli_parses_hooks_in_order() {
    let args = parse(&[
        "pilet-publish",
        "publish",
        "--fresh",
        "--hook",
        "before-build=npm run lint",
        "--hook",
        "after-declaration=./check-types.sh",
    ]);
    let points: Vec<_> = args.hook.iter().map(|hook| hook.point).collect();
    assert_eq!(points, vec![HookPoint::BeforeBuild, HookPoint::AfterDeclaration]);
    assert_eq!(
        args.hook.first().map(|hook| hook.command.as_str()),
        Some("npm run lint")
    );
}

#[rstest]
#[case::unknown_checkpoint(&["--hook", "during-build=true"])]
#[case::missing_separator(&["--field", "tag"])]
#[case::empty_key(&["--header", "=value"])]
#[case::blank_scheme(&["--auth", " "])]
#[case::unknown_source(&["--from", "ftp"])]
fn cli_rejects_malformed_values(#[case] extra: &[&str]) {
    let mut argv = vec!["pilet-publish", "publish"];
    argv.extend_from_slice(extra);
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn negated_build_flags_win_when_last() {
    let args = parse(&[
        "pilet-publish",
        "publish",
        "--fresh",
        "--minify",
        "--no-minify",
        "--no-source-maps",
        "--source-maps",
        "--no-declaration",
        "--no-content-hash",
        "--schema",
        "v2",
    ]);
    assert!(args.build.no_minify);
    assert!(!args.build.no_source_maps);
    assert!(args.build.no_declaration);
    assert!(args.build.no_content_hash);
    assert_eq!(args.build.schema.as_deref(), Some("v2"));
}

#[test]
fn environment_supplies_feed_and_key() {
    let cli = temp_env::with_vars(
        [
            ("PILET_FEED_URL", Some("https://env.example/feed")),
            ("PILET_API_KEY", Some("from-env")),
        ],
        || Cli::try_parse_from(["pilet-publish", "publish"]).expect("arguments parse"),
    );
    let Command::Publish(args) = cli.command;
    assert_eq!(args.url.as_deref(), Some("https://env.example/feed"));
    assert_eq!(args.api_key.as_deref(), Some("from-env"));
}

#[test]
fn publish_requires_subcommand() {
    assert!(Cli::try_parse_from(["pilet-publish"]).is_err());
}

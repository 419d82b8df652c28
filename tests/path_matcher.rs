// tests/path_matcher.rs
mod common;
use crate::common::init_tracing;

use std::path::{Path, PathBuf};

use proptest::prelude::*;

use goforge::types::ChangeKind;
use goforge::watch::{PathMatcher, DEFAULT_EXCLUDE, DEFAULT_INCLUDE};

fn strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|s| s.to_string()).collect()
}

fn root() -> PathBuf {
    PathBuf::from("/work/app")
}

fn default_matcher() -> PathMatcher {
    PathMatcher::new(root(), &strings(DEFAULT_INCLUDE), &strings(DEFAULT_EXCLUDE))
        .expect("default patterns compile")
}

fn relevant(m: &PathMatcher, rel: &str, kind: ChangeKind) -> bool {
    m.is_relevant(&root().join(rel), kind)
}

#[test]
fn go_and_config_writes_are_relevant() {
    init_tracing();
    let m = default_matcher();

    assert!(relevant(&m, "main.go", ChangeKind::Write));
    assert!(relevant(&m, "internal/handlers/user.go", ChangeKind::Create));
    assert!(relevant(&m, "configs/config.yaml", ChangeKind::Write));
    assert!(relevant(&m, "goforge.yml", ChangeKind::Write));
    assert!(relevant(&m, "api/schema.json", ChangeKind::Write));
}

#[test]
fn non_restart_kinds_are_ignored() {
    init_tracing();
    let m = default_matcher();

    for kind in [
        ChangeKind::Remove,
        ChangeKind::Rename,
        ChangeKind::Metadata,
        ChangeKind::Other,
    ] {
        assert!(!relevant(&m, "main.go", kind), "{kind} must not restart");
    }
}

#[test]
fn default_excludes_win_over_includes() {
    init_tracing();
    let m = default_matcher();

    assert!(!relevant(&m, "handlers/user_test.go", ChangeKind::Write));
    assert!(!relevant(&m, "vendor/github.com/x/y.go", ChangeKind::Write));
    assert!(!relevant(&m, "dist/bundle.json", ChangeKind::Write));
    assert!(!relevant(&m, "node_modules/pkg/package.json", ChangeKind::Create));
    assert!(!relevant(&m, ".git/config.yml", ChangeKind::Write));
    assert!(!relevant(&m, "server.log", ChangeKind::Write));
}

#[test]
fn unrelated_extensions_are_ignored() {
    init_tracing();
    let m = default_matcher();

    assert!(!relevant(&m, "README.md", ChangeKind::Write));
    assert!(!relevant(&m, "web/app.ts", ChangeKind::Write));
    assert!(!relevant(&m, "main.go.orig", ChangeKind::Write));
}

#[test]
fn editor_artifacts_are_ignored() {
    init_tracing();
    let m = default_matcher();

    for rel in [
        ".main.go.swp",
        "handlers/.user.go",
        "~main.go",
        "main.go~.swo",
        "#main.go#",
        "handlers/user.go.tmp",
    ] {
        assert!(!relevant(&m, rel, ChangeKind::Write), "{rel} should be ignored");
    }
}

#[test]
fn paths_outside_root_are_ignored() {
    init_tracing();
    let m = default_matcher();

    assert!(!m.is_relevant(Path::new("/elsewhere/main.go"), ChangeKind::Write));
    assert!(!m.is_relevant(&root(), ChangeKind::Write));
}

#[test]
fn single_star_stays_within_one_component() {
    init_tracing();
    let m = PathMatcher::new(root(), &strings(&["cmd/*.go"]), &[]).unwrap();

    assert!(relevant(&m, "cmd/main.go", ChangeKind::Write));
    assert!(!relevant(&m, "cmd/server/main.go", ChangeKind::Write));
}

#[test]
fn bare_filename_exclude_applies_at_any_depth() {
    init_tracing();
    let m = PathMatcher::new(root(), &strings(&["**/*.go"]), &strings(&["generated.go"])).unwrap();

    assert!(!relevant(&m, "generated.go", ChangeKind::Write));
    assert!(!relevant(&m, "internal/db/generated.go", ChangeKind::Write));
    assert!(relevant(&m, "internal/db/models.go", ChangeKind::Write));
}

#[test]
fn directory_exclusion_is_reported_for_the_walk() {
    init_tracing();
    let m = default_matcher();

    assert!(m.is_dir_excluded("vendor"));
    assert!(m.is_dir_excluded(".git"));
    assert!(m.is_dir_excluded("node_modules"));
    assert!(!m.is_dir_excluded("internal"));
    assert!(!m.is_dir_excluded("internal/vendor_utils"));
    assert!(!m.is_dir_excluded(""));
}

#[test]
fn invalid_glob_is_a_config_error() {
    init_tracing();
    let err = PathMatcher::new(root(), &strings(&["src/[abc"]), &[]).unwrap_err();
    assert!(err.to_string().contains("src/[abc"), "unexpected error: {err}");
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn ext() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["go", "yml", "yaml", "json", "md", "txt", "rs"])
}

fn kind() -> impl Strategy<Value = ChangeKind> {
    prop::sample::select(vec![
        ChangeKind::Create,
        ChangeKind::Write,
        ChangeKind::Remove,
        ChangeKind::Rename,
        ChangeKind::Metadata,
        ChangeKind::Other,
    ])
}

proptest! {
    /// Nothing below an excluded directory is ever relevant.
    #[test]
    fn excluded_directory_contents_never_relevant(
        top in prop::sample::select(vec!["vendor", "dist", "node_modules", ".git"]),
        middle in prop::collection::vec(segment(), 0..4),
        name in segment(),
        ext in ext(),
        kind in kind(),
    ) {
        let m = default_matcher();
        let mut rel = top.to_string();
        for seg in &middle {
            rel.push('/');
            rel.push_str(seg);
        }
        rel.push('/');
        rel.push_str(&format!("{name}.{ext}"));

        prop_assert!(!relevant(&m, &rel, kind));
    }

    /// With no excludes, a write or create on an included file is relevant
    /// and a delete never is.
    #[test]
    fn included_files_follow_change_kind(
        dirs in prop::collection::vec(segment(), 0..4),
        name in segment(),
        kind in kind(),
    ) {
        let m = PathMatcher::new(root(), &strings(&["**/*.go"]), &[]).unwrap();
        let mut rel = dirs.join("/");
        if !rel.is_empty() {
            rel.push('/');
        }
        rel.push_str(&format!("{name}.go"));

        prop_assert_eq!(relevant(&m, &rel, kind), kind.is_restart_worthy());
        prop_assert!(!relevant(&m, &rel, ChangeKind::Remove));
    }
}

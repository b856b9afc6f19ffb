//! CLI tests: spawn the texonfly binary against a fake TeX Live bin directory.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use texonfly::exit_codes;
use texonfly::test_support::{FakePackage, FakeTexLive};

fn texonfly(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_texonfly"))
        .current_dir(workdir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run texonfly")
}

fn foo() -> Vec<FakePackage> {
    vec![FakePackage::new("foo.sty", "foopkg")]
}

#[test]
fn installs_missing_package_and_recompiles() {
    let fake = FakeTexLive::new()
        .and_then(|fake| fake.with_compiler("pdflatex", &foo(), 1))
        .and_then(|fake| fake.with_tlmgr(&foo()))
        .expect("fake texlive");
    let work = tempfile::tempdir().expect("tempdir");
    let bin = fake.bin().display().to_string();

    let output = texonfly(work.path(), &["--texlive-bin", &bin, "paper.tex"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "stdout: {stdout}");
    assert_eq!(fake.compile_count(), 2);
    assert!(stdout.contains("texonfly: Searching repositories for missing file foo.sty"));
    assert!(stdout.contains("Found foo.sty in package(s) foopkg; installing"));

    let invocations = fake.tlmgr_invocations();
    assert_eq!(
        invocations,
        vec![
            "remove",
            "search --global --file foo.sty",
            "update --self",
            "install foopkg",
        ]
    );
}

#[test]
fn fail_silently_compiles_once_without_tlmgr() {
    let fake = FakeTexLive::new()
        .and_then(|fake| fake.with_compiler("pdflatex", &foo(), 3))
        .expect("fake texlive");
    let work = tempfile::tempdir().expect("tempdir");
    let bin = fake.bin().display().to_string();

    let output = texonfly(
        work.path(),
        &["--texlive-bin", &bin, "--fail-silently", "paper.tex"],
    );

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(fake.compile_count(), 1);
}

#[test]
fn missing_tlmgr_is_a_usage_error() {
    let fake = FakeTexLive::new()
        .and_then(|fake| fake.with_compiler("pdflatex", &foo(), 1))
        .expect("fake texlive");
    let work = tempfile::tempdir().expect("tempdir");
    let bin = fake.bin().display().to_string();

    let output = texonfly(work.path(), &["--texlive-bin", &bin, "paper.tex"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is not installed"), "stderr: {stderr}");
    // A custom bin directory was given, so the version hint is not shown.
    assert!(!stderr.contains("TeX Live 2010"), "stderr: {stderr}");
    assert_eq!(fake.compile_count(), 0);
}

#[test]
fn unstartable_compiler_exits_fatal_with_hint() {
    let fake = FakeTexLive::new()
        .and_then(|fake| fake.with_tlmgr(&foo()))
        .expect("fake texlive");
    let work = tempfile::tempdir().expect("tempdir");
    let bin = fake.bin().display().to_string();

    let output = texonfly(work.path(), &["--texlive-bin", &bin, "paper.tex"]);

    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Unable to start"), "stdout: {stdout}");
    assert!(stdout.contains("texonfly --help"), "stdout: {stdout}");
}

#[test]
fn config_file_selects_compiler() {
    let fake = FakeTexLive::new()
        .and_then(|fake| fake.with_compiler("lualatex", &[], 1))
        .and_then(|fake| fake.with_tlmgr(&[]))
        .expect("fake texlive");
    let work = tempfile::tempdir().expect("tempdir");
    fs::write(
        work.path().join("texonfly.toml"),
        format!(
            "compiler = \"lualatex\"\ntexlive_bin = \"{}\"\n",
            fake.bin().display()
        ),
    )
    .expect("write config");

    let output = texonfly(work.path(), &["paper.tex"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(fake.compile_count(), 1);
    assert_eq!(fake.tlmgr_invocations(), vec!["remove"]);
}

#[test]
fn invalid_config_is_fatal() {
    let work = tempfile::tempdir().expect("tempdir");
    fs::write(
        work.path().join("texonfly.toml"),
        "speech_when = \"sometimes\"\n",
    )
    .expect("write config");

    let output = texonfly(work.path(), &["paper.tex"]);

    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("texonfly.toml"), "stderr: {stderr}");
}

#[test]
fn document_argument_is_required() {
    let work = tempfile::tempdir().expect("tempdir");

    let output = texonfly(work.path(), &[]);

    assert_eq!(output.status.code(), Some(2));
}

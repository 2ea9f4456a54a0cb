//! Command-line tests for the `sigstore-conformance` binary.
//!
//! The system `true` and `false` utilities stand in for clients that accept
//! or reject everything, which is enough to drive the suite's classification
//! end to end.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const HARNESS_ENV: [&str; 11] = [
    "GHA_SIGSTORE_CONFORMANCE_ENTRYPOINT",
    "GHA_SIGSTORE_CONFORMANCE_CONTAINER",
    "GHA_SIGSTORE_CONFORMANCE_CONTAINER_PROGRAM",
    "GHA_SIGSTORE_CONFORMANCE_ENVIRONMENT",
    "GHA_SIGSTORE_CONFORMANCE_SKIP_SIGNING",
    "GHA_SIGSTORE_CONFORMANCE_MIN_ID_TOKEN_VALIDITY",
    "GHA_SIGSTORE_CONFORMANCE_TOKEN_SOURCE",
    "GHA_SIGSTORE_CONFORMANCE_XFAIL",
    "GHA_SIGSTORE_CONFORMANCE_ASSETS",
    "GHA_SIGSTORE_CONFORMANCE_CLIENT_SHA",
    "GITHUB_STEP_SUMMARY",
];

fn utility(name: &str) -> PathBuf {
    ["/bin", "/usr/bin"]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("no `{name}` utility found"))
}

fn harness() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sigstore-conformance"));
    for name in HARNESS_ENV {
        cmd.env_remove(name);
    }
    cmd
}

/// A scratch directory holding the assets and the report.
struct Run {
    dir: TempDir,
}

impl Run {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir(&assets).unwrap();
        fs::write(assets.join("has_root_in_chain.txt"), b"root in chain\n").unwrap();
        fs::write(assets.join("a.txt"), b"DO NOT MODIFY ME!\n").unwrap();
        Self { dir }
    }

    fn report_path(&self) -> PathBuf {
        self.dir.path().join("report.json")
    }

    fn run(&self, client: &str, extra: &[&str]) -> Output {
        harness()
            .current_dir(self.dir.path())
            .arg("run")
            .arg("--entrypoint")
            .arg(utility(client))
            .args(["--assets", "assets", "--skip-signing"])
            .arg("--report")
            .arg(self.report_path())
            .args(extra)
            .output()
            .unwrap()
    }

    fn report(&self) -> serde_json::Value {
        serde_json::from_slice(&fs::read(self.report_path()).unwrap()).unwrap()
    }
}

#[test]
fn list_prints_case_ids() {
    let output = harness().arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("bundle::test_verify_rejects_root[PATH]\n"));
    assert!(stdout.contains("bundle::test_verify_rejects_root[DIGEST]\n"));
    assert!(stdout.contains("sign_verify::test_verify_empty[sigcrt] (signing, staging)\n"));
    assert!(stdout.contains("certificate::test_verify_with_trust_root\n"));
}

#[test]
fn list_implementations_prints_pairs() {
    let output = harness()
        .args(["list", "--implementations"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4 + 6);
    assert_eq!(lines[0], "sigstore-python-stable");
    assert!(lines.contains(&"sigstore-python-stable x cosign-nightly"));
    assert!(!lines.contains(&"cosign-stable x cosign-stable"));
}

#[test]
fn rejecting_client_passes_rejection_cases() {
    let run = Run::new();
    let output = run.run("false", &["-k", "rejects_root"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let report = run.report();
    assert_eq!(report["exitcode"], 0);
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["passed"], 2);
    assert_eq!(report["tests"][0]["nodeid"], "bundle::test_verify_rejects_root[PATH]");
    assert_eq!(report["tests"][1]["nodeid"], "bundle::test_verify_rejects_root[DIGEST]");
}

#[test]
fn accepting_client_fails_rejection_cases() {
    let run = Run::new();
    let output = run.run("true", &["-k", "rejects_root"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let report = run.report();
    assert_eq!(report["summary"]["failed"], 2);
    assert_eq!(report["tests"][0]["outcome"], "failed");
    let message = report["tests"][0]["message"].as_str().unwrap();
    assert!(message.contains("client unexpectedly succeeded"));
    assert!(message.contains("!!! STDOUT !!!"));

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("FAILED bundle::test_verify_rejects_root[PATH]"));
}

#[test]
fn expected_failures_are_strict() {
    let run = Run::new();
    let output = run.run(
        "true",
        &["-k", "rejects_root", "--xfail", "test_verify_rejects_root"],
    );
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(run.report()["summary"]["xfailed"], 2);

    let output = run.run(
        "false",
        &["-k", "rejects_root", "--xfail", "test_verify_rejects_root"],
    );
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let report = run.report();
    assert_eq!(report["summary"]["failed"], 2);
    assert!(
        report["tests"][0]["message"]
            .as_str()
            .unwrap()
            .contains("XPASS(strict)")
    );
}

#[test]
fn container_program_runs_the_image() {
    let run = Run::new();
    let output = harness()
        .current_dir(run.dir.path())
        .args(["run", "--container", "--container-program"])
        .arg(utility("false"))
        .args(["--entrypoint", "ghcr.io/example/client:v1"])
        .args(["--assets", "assets", "--skip-signing", "-k", "rejects_root"])
        .arg("--report")
        .arg(run.report_path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(run.report()["summary"]["passed"], 2);
}

#[test]
fn signing_and_staging_skips() {
    let run = Run::new();
    let output = run.run("false", &["-k", "sign_verify::"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let report = run.report();
    assert_eq!(report["summary"]["skipped"], report["summary"]["total"]);
    assert_eq!(report["tests"][0]["message"], "skipping test that requires signing");

    let output = run.run("false", &["-k", "bundle::test_verify[", "--staging"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let report = run.report();
    assert_eq!(report["summary"]["skipped"], 2);
    assert_eq!(
        report["tests"][0]["message"],
        "skipping test that doesn't support staging"
    );
}

#[test]
fn client_metadata_lands_in_report() {
    let run = Run::new();
    let output = harness()
        .current_dir(run.dir.path())
        .env("GHA_SIGSTORE_CONFORMANCE_CLIENT_SHA", "0123abcd")
        .arg("run")
        .arg("--entrypoint")
        .arg(utility("false"))
        .args(["--assets", "assets", "--skip-signing", "-k", "rejects_root[PATH]"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    // Default report location, relative to the invocation directory.
    let report: serde_json::Value = serde_json::from_slice(
        &fs::read(run.dir.path().join("conformance-report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["environment"]["client_sha"], "0123abcd");
    assert_eq!(report["summary"]["passed"], 1);
}

#[test]
fn missing_entrypoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = harness()
        .current_dir(dir.path())
        .args(["run", "--skip-signing"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("entrypoint"), "{stderr}");
    assert!(stderr.contains("GHA_SIGSTORE_CONFORMANCE_ENTRYPOINT"), "{stderr}");
    assert!(!dir.path().join("conformance-report.json").exists());
}

#[test]
fn missing_assets_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let output = harness()
        .current_dir(dir.path())
        .arg("run")
        .arg("--entrypoint")
        .arg(utility("false"))
        .args(["--assets", "nowhere", "--skip-signing", "-k", "rejects_root"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("failed to set up workspace"), "{stderr}");
}

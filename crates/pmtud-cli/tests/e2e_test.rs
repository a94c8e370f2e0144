//! End-to-end tests for the pmtud CLI.
//!
//! These run the actual binary against real targets and verify the JSON
//! output. They need raw-socket privileges and network access, so they are
//! ignored by default.

use serde::Deserialize;
use std::process::Command;

const LOCALHOST_TARGET: &str = "127.0.0.1";
const PUBLIC_TARGET: &str = "one.one.one.one";

/// Results structure matching the JSON output.
#[derive(Debug, Deserialize)]
struct CombinedResult {
    v4: Option<FamilyResult>,
    v6: Option<FamilyResult>,
}

#[derive(Debug, Deserialize)]
struct FamilyResult {
    pmtu: Option<u16>,
    #[serde(default)]
    partial: bool,
    error: Option<String>,
    error_detail: Option<String>,
}

/// Get the CLI binary path.
fn get_cli_binary() -> String {
    for profile in ["release", "debug"] {
        let path = format!("../../target/{}/pmtud", profile);
        if std::path::Path::new(&path).exists() {
            return path;
        }
    }
    panic!("CLI binary not found. Build with 'cargo build' first");
}

/// Run the CLI and parse its output.
fn run_pmtud(target: &str, extra_args: &[&str]) -> Result<CombinedResult, String> {
    let binary = get_cli_binary();

    // Raw sockets need elevated privileges on Unix.
    let mut command = Command::new("sudo");
    command.arg(&binary).args(extra_args).arg(target);

    let output = command
        .output()
        .map_err(|e| format!("failed to run command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed with status {}:\n{}",
            output.status, stderr
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .map_err(|e| format!("failed to parse JSON output: {}\noutput: {}", e, stdout))
}

fn validate_family(result: &FamilyResult) {
    match (result.pmtu, &result.error) {
        (Some(pmtu), None) => {
            assert!(pmtu >= 68, "path MTU below the v4 minimum: {}", pmtu);
            if result.partial {
                eprintln!("note: search did not fully converge, best value {}", pmtu);
            }
        }
        (None, Some(error)) => {
            assert!(
                result.error_detail.is_some(),
                "error {} carries no detail",
                error
            );
        }
        other => panic!("pmtu and error must be mutually exclusive: {:?}", other),
    }
}

#[test]
#[ignore] // Requires root privileges
fn test_localhost() {
    let result = run_pmtud(LOCALHOST_TARGET, &["--timeout", "500"]).expect("pmtud failed");

    let v4 = result.v4.expect("localhost should have a v4 result");
    validate_family(&v4);
    // Loopback delivers the largest possible datagram.
    assert_eq!(v4.pmtu, Some(65535));
    assert!(result.v6.is_none());
}

#[test]
#[ignore] // Requires root privileges and network access
fn test_public_target() {
    let result = run_pmtud(PUBLIC_TARGET, &[]).expect("pmtud failed");

    assert!(
        result.v4.is_some() || result.v6.is_some(),
        "at least one family should resolve"
    );
    if let Some(v4) = &result.v4 {
        validate_family(v4);
        if let Some(pmtu) = v4.pmtu {
            assert!((68..=9000).contains(&pmtu), "implausible v4 path MTU {}", pmtu);
        }
    }
    if let Some(v6) = &result.v6 {
        validate_family(v6);
        if let Some(pmtu) = v6.pmtu {
            assert!((1280..=9000).contains(&pmtu), "implausible v6 path MTU {}", pmtu);
        }
    }
}

#[test]
#[ignore] // Requires network access for DNS only; no probes are sent
fn test_unresolvable_hostname() {
    let result = run_pmtud("does-not-exist.invalid", &[]).expect("pmtud failed");

    let v4 = result.v4.expect("v4 result");
    let v6 = result.v6.expect("v6 result");
    assert_eq!(v4.error.as_deref(), Some("resolution_failure"));
    assert_eq!(v6.error.as_deref(), Some("resolution_failure"));
}

//! Local process execution.

use super::ExecOutput;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a program to completion, capturing its output.
pub fn run_command(program: &str, args: &[String]) -> Result<ExecOutput, String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Arguments for `opentrons_simulate`.
pub fn simulate_args(protocol: &Path) -> Vec<String> {
    vec![protocol.display().to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExecOutput {
        run_command("sh", &["-c".to_string(), script.to_string()]).unwrap()
    }

    #[test]
    fn test_local_echo() {
        let out = sh("echo hello");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_local_failure() {
        let out = sh("exit 42");
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[test]
    fn test_local_stderr() {
        let out = sh("echo err >&2");
        assert!(out.success());
        assert!(out.stderr.contains("err"));
    }

    #[test]
    fn test_local_missing_program() {
        let err = run_command("pipettor-no-such-program", &[]).unwrap_err();
        assert!(err.contains("failed to spawn"));
    }

    #[test]
    fn test_local_simulate_args() {
        assert_eq!(simulate_args(Path::new("out/p.py")), vec!["out/p.py".to_string()]);
    }
}

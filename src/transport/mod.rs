//! Robot transport — file transfer and protocol execution.
//!
//! Uses the `ssh`/`scp` binaries and the Opentrons command-line tools directly.
//! Every argument vector comes from a pure builder so it can be checked
//! without a robot.

pub mod local;
pub mod ssh;

use crate::core::types::RobotConfig;
use std::path::Path;

/// Output from a transport command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Copy a protocol to the robot. Returns the path it will have there.
pub fn transfer(robot: &RobotConfig, local: &Path, remote_dir: &str) -> Result<String, String> {
    let out = local::run_command("scp", &ssh::scp_args(robot, local, remote_dir))?;
    if !out.success() {
        return Err(format!(
            "scp to {} failed (exit {}): {}",
            robot.ip,
            out.exit_code,
            out.stderr.trim()
        ));
    }
    remote_path(remote_dir, local)
}

/// Run a protocol already on the robot with `opentrons_execute`.
pub fn execute(robot: &RobotConfig, remote_path: &str) -> Result<ExecOutput, String> {
    ssh::exec_ssh(robot, &format!("opentrons_execute {}", ssh::shell_quote(remote_path)))
}

/// Remove a protocol from the robot.
pub fn remove(robot: &RobotConfig, remote_path: &str) -> Result<ExecOutput, String> {
    ssh::exec_ssh(robot, &format!("rm -f {}", ssh::shell_quote(remote_path)))
}

/// Simulate a protocol locally with `opentrons_simulate`.
pub fn simulate(protocol: &Path) -> Result<ExecOutput, String> {
    local::run_command("opentrons_simulate", &local::simulate_args(protocol))
}

/// Where `local` lands inside `remote_dir`.
pub fn remote_path(remote_dir: &str, local: &Path) -> Result<String, String> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("{} has no file name", local.display()))?;
    Ok(format!("{}/{}", remote_dir.trim_end_matches('/'), name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_exec_output_success() {
        let ok = ExecOutput { exit_code: 0, stdout: "ok".into(), stderr: "".into() };
        assert!(ok.success());
        let fail = ExecOutput { exit_code: 1, stdout: "".into(), stderr: "err".into() };
        assert!(!fail.success());
        let sig = ExecOutput { exit_code: -1, stdout: "".into(), stderr: "killed".into() };
        assert!(!sig.success());
    }

    #[test]
    fn test_transport_remote_path() {
        let p = Path::new("/tmp/out/protocol.py");
        assert_eq!(remote_path("/root", p).unwrap(), "/root/protocol.py");
        assert_eq!(remote_path("/data/", p).unwrap(), "/data/protocol.py");
        assert!(remote_path("/root", Path::new("/")).is_err());
    }
}

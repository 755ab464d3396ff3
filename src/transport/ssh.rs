//! SSH and SCP transport to a robot.

use super::ExecOutput;
use crate::core::types::RobotConfig;
use std::path::Path;
use std::process::{Command, Stdio};

const SSH_OPTIONS: [&str; 6] = [
    "-o",
    "BatchMode=yes",
    "-o",
    "ConnectTimeout=5",
    "-o",
    "StrictHostKeyChecking=accept-new",
];

/// Expand a leading `~/` to `$HOME`.
pub fn expand_key(key: &str) -> String {
    if let Some(rest) = key.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    key.to_string()
}

/// Quote a string for the remote POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn common_args(robot: &RobotConfig) -> Vec<String> {
    let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
    if let Some(key) = &robot.ssh_key {
        args.push("-i".to_string());
        args.push(expand_key(key));
    }
    args
}

/// Arguments for `ssh` running `remote_cmd` on the robot.
pub fn ssh_args(robot: &RobotConfig, remote_cmd: &str) -> Vec<String> {
    let mut args = common_args(robot);
    args.push(format!("{}@{}", robot.user, robot.ip));
    args.push(remote_cmd.to_string());
    args
}

/// Arguments for `scp` copying `local` into `remote_dir` on the robot.
pub fn scp_args(robot: &RobotConfig, local: &Path, remote_dir: &str) -> Vec<String> {
    let mut args = common_args(robot);
    args.push(local.display().to_string());
    args.push(format!("{}@{}:{}", robot.user, robot.ip, remote_dir));
    args
}

/// Run a command on the robot over SSH.
pub fn exec_ssh(robot: &RobotConfig, remote_cmd: &str) -> Result<ExecOutput, String> {
    let output = Command::new("ssh")
        .args(ssh_args(robot, remote_cmd))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to spawn ssh to {}: {}", robot.ip, e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

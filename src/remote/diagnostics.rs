//! Troubleshooting hints for connection and execution failures.
//!
//! The engine's errors stay short so they fit in a verdict line; these
//! helpers expand them into the longer, suggestion-bearing text the CLI
//! prints when asked for detail.

use crate::error::{Error, Hop};

/// Explains a connection failure, including which hop broke.
pub fn diagnose_ssh_error(error: &Error, port: u16, ssh_key: Option<&str>) -> String {
    let error = error.last_error();
    let error_str = error.to_string().to_lowercase();

    let host = match error {
        Error::Connection { host, .. } => host.as_str(),
        _ => "the remote host",
    };

    let mut suggestions = Vec::new();

    match error.hop() {
        Some(Hop::Bastion) => suggestions.push(format!(
            "• The bastion {} could not be reached; internal hosts are only reachable through it",
            host
        )),
        Some(Hop::Target) => suggestions.push(format!(
            "• The bastion worked but {} did not; check it is running and that the bastion can reach port {}",
            host, port
        )),
        _ => {}
    }

    // Network connectivity issues
    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("no route to host")
    {
        suggestions.push(format!("• Verify the host '{}' is reachable", host));
        suggestions.push(format!(
            "• Check if SSH is running on port {} (try: ssh -p {} {})",
            port, port, host
        ));
        suggestions.push("• Check security lists / firewall rules for port 22".to_string());
    }

    // Authentication issues
    if error_str.contains("authentication")
        || error_str.contains("permission denied")
        || error_str.contains("publickey")
    {
        suggestions.push("• Verify your SSH key has correct permissions (chmod 600)".to_string());

        if let Some(key) = ssh_key {
            suggestions.push(format!("• Check that the SSH key exists: {}", key));
            suggestions.push(format!(
                "• Verify the public key was provisioned into ~/.ssh/authorized_keys on {}",
                host
            ));
        } else {
            suggestions.push("• Set ssh.private_key in the configuration".to_string());
            suggestions.push("• Verify your SSH agent is running (ssh-add -l)".to_string());
        }
    }

    if error_str.contains("handshake") || error_str.contains("banner") {
        suggestions.push(format!(
            "• Something other than an SSH server answered on {}:{}",
            host, port
        ));
    }

    // Generic issues
    if suggestions.is_empty() {
        suggestions.push("• Verify the remote host is accessible".to_string());
        suggestions.push(format!(
            "• Test the connection manually: ssh -p {} {}",
            port, host
        ));
    }

    format!(
        "SSH connection failed: {}\n\nTroubleshooting suggestions:\n{}",
        error,
        suggestions.join("\n")
    )
}

/// Explains a remote command that exited non-zero.
pub fn diagnose_execution_failure(exit_code: i32, stderr: &str, command: &str, host: &str) -> String {
    let stderr_lower = stderr.to_lowercase();
    let mut suggestions = Vec::new();

    if stderr_lower.contains("command not found") || exit_code == 127 {
        suggestions.push(format!(
            "• '{}' is not installed or not in PATH on {}",
            extract_command_name(command),
            host
        ));
    } else if stderr_lower.contains("sudo") && stderr_lower.contains("password") {
        suggestions.push(format!(
            "• The login user on {} needs passwordless sudo for this probe",
            host
        ));
    } else if stderr_lower.contains("permission denied") || exit_code == 126 {
        suggestions.push("• Permission denied when executing the command".to_string());
    } else if stderr_lower.contains("could not resolve host")
        || stderr_lower.contains("failed to connect")
    {
        suggestions.push(format!(
            "• {} could not reach the probed service; check routing from that host",
            host
        ));
    } else {
        suggestions.push(format!("• Test the command manually: ssh {} '{}'", host, command));
    }

    let mut msg = format!("Remote command failed on {}\n", host);
    msg.push_str(&format!("Command: {}\n", command));
    msg.push_str(&format!("Exit code: {}\n\n", exit_code));

    if !stderr.trim().is_empty() {
        msg.push_str("Stderr:\n");
        msg.push_str(&indent_text(stderr.trim(), 2));
        msg.push_str("\n\n");
    }

    msg.push_str("Troubleshooting suggestions:\n");
    msg.push_str(&suggestions.join("\n"));
    msg
}

/// Long-form explanation for any engine error.
pub fn describe(error: &Error, port: u16, ssh_key: Option<&str>) -> String {
    match error.last_error() {
        Error::Connection { .. } => diagnose_ssh_error(error, port, ssh_key),
        Error::Execution {
            host,
            command,
            exit_code: Some(code),
            stderr,
            ..
        } => diagnose_execution_failure(*code, stderr, command, host),
        _ => error.to_string(),
    }
}

fn extract_command_name(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

fn indent_text(text: &str, spaces: usize) -> String {
    let indent = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{}{}", indent, line))
        .collect::<Vec<_>>()
        .join("\n")
}

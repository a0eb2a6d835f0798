//! Checking whether a named desktop process is running.

use std::process::{Command, Stdio};

pub trait ProcessProbe {
    fn is_running(&self, name: &str) -> anyhow::Result<bool>;
}

/// Case-insensitive `pgrep` lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgrepProbe;

impl ProcessProbe for PgrepProbe {
    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        let status = Command::new("pgrep")
            .args(["-i", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        tracing::debug!(process = name, code = ?status.code(), "pgrep finished");
        Ok(status.success())
    }
}

//! Transport abstraction for talking NDJSON to a sandboxed strategy
//! process (C12.3, open question 2). No hypervisor crate sits in this
//! dependency stack, so the only implementation here drives a child
//! process over stdio pipes instead of a vsock connection into a microVM —
//! the wire format and lifecycle contract above this trait are unchanged.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};

use crate::error::{PlatformError, Result};

#[async_trait]
pub trait SandboxTransport: Send {
    /// Boots the guest process. Must complete within `boot_timeout`.
    async fn boot(&mut self, boot_timeout: Duration) -> Result<()>;

    /// Sends one NDJSON line to the guest.
    async fn send_line(&mut self, value: &Value) -> Result<()>;

    /// Reads the next NDJSON line from the guest, if any arrives before
    /// `call_timeout` elapses. `Ok(None)` means the guest closed its
    /// output stream.
    async fn recv_line(&mut self, call_timeout: Duration) -> Result<Option<Value>>;

    /// Terminates the guest process, waiting briefly for a clean exit.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Spawns `program` with `args`, piping stdin/stdout, and frames each side
/// of the conversation as one JSON object per line.
pub struct SubprocessTransport {
    child: Option<Child>,
    stdin: Option<tokio::process::ChildStdin>,
    stdout: Option<BufReader<tokio::process::ChildStdout>>,
    program: String,
    args: Vec<String>,
}

impl SubprocessTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            child: None,
            stdin: None,
            stdout: None,
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SandboxTransport for SubprocessTransport {
    async fn boot(&mut self, boot_timeout: Duration) -> Result<()> {
        let spawn = async {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
            cmd.spawn().map_err(|e| PlatformError::Sandbox(format!("spawn failed: {e}")))
        };

        let mut child = timeout(boot_timeout, spawn)
            .await
            .map_err(|_| PlatformError::Sandbox("boot timed out".to_string()))??;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlatformError::Sandbox("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlatformError::Sandbox("child has no stdout".to_string()))?;

        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout));
        self.child = Some(child);
        Ok(())
    }

    async fn send_line(&mut self, value: &Value) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PlatformError::Sandbox("transport not booted".to_string()))?;
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PlatformError::Sandbox(format!("write failed: {e}")))?;
        stdin.flush().await.map_err(|e| PlatformError::Sandbox(format!("flush failed: {e}")))
    }

    async fn recv_line(&mut self, call_timeout: Duration) -> Result<Option<Value>> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| PlatformError::Sandbox("transport not booted".to_string()))?;
        let mut buf = String::new();
        let n = timeout(call_timeout, stdout.read_line(&mut buf))
            .await
            .map_err(|_| PlatformError::Sandbox("recv timed out".to_string()))?
            .map_err(|e| PlatformError::Sandbox(format!("read failed: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let waited = timeout(Duration::from_secs(5), child.wait()).await;
            if waited.is_err() {
                let _ = child.kill().await;
            }
        }
        Ok(())
    }
}

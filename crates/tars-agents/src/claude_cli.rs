use std::time::Duration;

use tars_models::config::ClaudeConfig;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;

const CLAUDE_BIN: &str = "claude";

/// Model and deadline for one `claude` CLI call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaudeCli {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::from(&ClaudeConfig::default())
    }
}

impl From<&ClaudeConfig> for ClaudeCli {
    fn from(config: &ClaudeConfig) -> Self {
        Self {
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

impl ClaudeCli {
    /// Run `claude -p` and return stdout. The child process is killed if the
    /// call times out or `cancel` fires.
    pub async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        debug!(model = %self.model, prompt_len = user_prompt.len(), "Invoking claude CLI");

        let child = Command::new(CLAUDE_BIN)
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &self.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = tokio::time::timeout(self.timeout, child) => result
                .map_err(|_| AgentError::Timeout(self.timeout))?
                .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
            return Err(AgentError::Cli(format!(
                "claude exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(AgentError::Cli("Claude returned empty response".to_string()));
        }
        Ok(stdout)
    }
}

/// True if `claude --version` runs successfully.
pub async fn check_cli_available(cancel: &CancellationToken) -> bool {
    let probe = Command::new(CLAUDE_BIN)
        .arg("--version")
        .kill_on_drop(true)
        .output();
    tokio::select! {
        _ = cancel.cancelled() => false,
        result = probe => matches!(result, Ok(output) if output.status.success()),
    }
}

//! Cancellable child-process execution for external encoders.

use std::path::Path;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Run an encoder command to completion, killing it if the token fires.
///
/// Succeeds only when the process exits zero and the expected output file
/// exists afterwards.
pub(super) async fn run_encoder_command(
    cancel: &CancellationToken,
    mut command: Command,
    output: &Path,
) -> Result<()> {
    let mut child = command
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::encoder(format!("failed to spawn encoder process: {}", e)))?;

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(Error::Cancelled);
        }
        status = child.wait() => status
            .map_err(|e| Error::encoder(format!("failed to wait for encoder process: {}", e)))?,
    };

    if !status.success() {
        match status.code() {
            Some(code) => {
                warn!("Encoder process exited with code {}", code);
                return Err(Error::encoder(format!(
                    "encoder process exited with code {}",
                    code
                )));
            }
            None => {
                return Err(Error::encoder("encoder process killed by signal"));
            }
        }
    }

    if !output.exists() {
        return Err(Error::encoder(format!(
            "encoder produced no output at {}",
            output.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");

        let mut command = Command::new("touch");
        command.arg(&output);

        run_encoder_command(&CancellationToken::new(), command, &output)
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never-created");

        let mut command = Command::new("false");
        command.arg("ignored");

        let err = run_encoder_command(&CancellationToken::new(), command, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoder(_)));
    }

    #[tokio::test]
    async fn test_missing_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never-created");

        // Exits zero but writes nothing.
        let command = Command::new("true");

        let err = run_encoder_command(&CancellationToken::new(), command, &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("produced no output"));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never-created");

        let mut command = Command::new("sleep");
        command.arg("30");

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let start = std::time::Instant::now();
        let err = run_encoder_command(&cancel, command, &output)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }
}

//! Pass-through encoder.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EncodeOptions, Encoder};
use crate::error::{Error, Result};

/// Copies the original bytes through unchanged.
///
/// Used when the caller wants to keep the uploaded original; width, height,
/// quality and speed are ignored.
pub struct CopyEncoder;

#[async_trait]
impl Encoder for CopyEncoder {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn command(&self) -> Option<&'static str> {
        None
    }

    async fn encode(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: &Path,
        _opts: &EncodeOptions,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::fs::copy(input, output)
            .await
            .map_err(|e| Error::encoder(format!("failed to copy original: {}", e)))?;

        debug!(
            "copied original file from {} to {}",
            input.display(),
            output.display()
        );
        Ok(())
    }
}

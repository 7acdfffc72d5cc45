//! WebP encoder backed by `cwebp`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::run_encoder_command;
use super::{EncodeOptions, Encoder};
use crate::error::Result;

pub struct WebpEncoder;

impl WebpEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebpEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for WebpEncoder {
    fn name(&self) -> &'static str {
        "webp"
    }

    fn command(&self) -> Option<&'static str> {
        Some("cwebp")
    }

    async fn encode(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: &Path,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let mut command = Command::new("cwebp");
        command
            .arg("-q")
            .arg(opts.quality.to_string())
            .arg("-m")
            .arg(opts.speed.to_string())
            .arg("-resize")
            .arg(opts.width.to_string())
            .arg(opts.height.to_string())
            .arg(input)
            .arg("-o")
            .arg(output);

        run_encoder_command(cancel, command, output).await
    }
}

//! AVIF encoder backed by `avifenc`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::run_encoder_command;
use super::{EncodeOptions, Encoder};
use crate::error::Result;

pub struct AvifEncoder;

impl AvifEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AvifEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for AvifEncoder {
    fn name(&self) -> &'static str {
        "avif"
    }

    fn command(&self) -> Option<&'static str> {
        Some("avifenc")
    }

    async fn encode(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: &Path,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let mut command = Command::new("avifenc");
        command
            .arg("--min")
            .arg(opts.quality.to_string())
            .arg("--max")
            .arg(opts.quality.to_string())
            .arg("--speed")
            .arg(opts.speed.to_string())
            .arg("--resize")
            .arg(format!("{}x{}", opts.width, opts.height))
            .arg(input)
            .arg(output);

        run_encoder_command(cancel, command, output).await
    }
}

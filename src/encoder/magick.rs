//! ImageMagick-backed encoders for JPEG and PNG output.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::run_encoder_command;
use super::{EncodeOptions, Encoder};
use crate::error::Result;

/// Encoder shelling out to `magick` for raster formats it handles natively.
pub struct MagickEncoder {
    name: &'static str,
    format: &'static str,
}

impl MagickEncoder {
    /// JPEG variant.
    pub fn jpg() -> Self {
        Self {
            name: "jpg",
            format: "jpg",
        }
    }

    /// PNG variant.
    pub fn png() -> Self {
        Self {
            name: "png",
            format: "png",
        }
    }
}

#[async_trait]
impl Encoder for MagickEncoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn command(&self) -> Option<&'static str> {
        Some("magick")
    }

    async fn encode(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: &Path,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let mut command = Command::new("magick");
        command
            .arg(input)
            .arg("-resize")
            .arg(format!("{}x{}", opts.width, opts.height))
            .arg("-quality")
            .arg(opts.quality.to_string())
            .arg(format!("{}:{}", self.format, output.display()));

        run_encoder_command(cancel, command, output).await
    }
}

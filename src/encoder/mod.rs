//! Encoder registry.
//!
//! Maps format names to encoder implementations. Encoders that shell out to
//! an external tool are probed at registration time; when the binary is not
//! resolvable the encoder is skipped with a warning, so a job requesting it
//! later fails at execution time with "encoder not found".

mod avif;
mod copy;
mod magick;
mod process;
mod webp;

pub use avif::AvifEncoder;
pub use copy::CopyEncoder;
pub use magick::MagickEncoder;
pub use webp::WebpEncoder;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;

/// Options passed to every encoder invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub width: u32,
    pub height: u32,
    /// 1–100 for lossy formats.
    pub quality: u32,
    /// Encoder speed/efficiency tradeoff.
    pub speed: u32,
}

/// Trait for image encoders.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// The format name this encoder is registered under.
    fn name(&self) -> &'static str;

    /// The external binary this encoder depends on, if any.
    fn command(&self) -> Option<&'static str>;

    /// Encode `input` into `output`.
    ///
    /// Implementations must honor the cancellation token; encoders backed
    /// by an external process kill the child when the token fires. Success
    /// requires the output file to exist afterwards.
    async fn encode(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: &Path,
        opts: &EncodeOptions,
    ) -> Result<()>;
}

/// Process-wide registry of encoders.
pub struct EncoderRegistry {
    encoders: HashMap<&'static str, Arc<dyn Encoder>>,
}

impl EncoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// Create a registry with every built-in encoder whose external tool is
    /// available, plus the always-present `copy` encoder.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MagickEncoder::jpg()));
        registry.register(Arc::new(MagickEncoder::png()));
        registry.register(Arc::new(WebpEncoder::new()));
        registry.register(Arc::new(AvifEncoder::new()));
        registry.register(Arc::new(CopyEncoder));
        registry
    }

    /// Register an encoder, probing its external command first.
    ///
    /// Unavailable encoders are silently omitted (logged at warn).
    pub fn register(&mut self, encoder: Arc<dyn Encoder>) {
        if let Some(command) = encoder.command() {
            if !probe_command(command) {
                warn!(
                    "encoder [{}] skipped: command '{}' not found",
                    encoder.name(),
                    command
                );
                return;
            }
            debug!("encoder [{}] registered (command: {})", encoder.name(), command);
        } else {
            debug!("encoder [{}] registered (no command required)", encoder.name());
        }
        self.encoders.insert(encoder.name(), encoder);
    }

    /// Look up an encoder by format name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Encoder>> {
        self.encoders.get(name).cloned()
    }

    /// Whether a format name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.encoders.contains_key(name)
    }

    /// Registered format names.
    pub fn names(&self) -> Vec<&'static str> {
        self.encoders.keys().copied().collect()
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Check that an external command is runnable by asking it for its version.
fn probe_command(command: &str) -> bool {
    std::process::Command::new(command)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

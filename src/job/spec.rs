//! Combined-job model, claims mapping, and output filename derivation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::JobSpec;
use crate::error::{Error, Result};
use crate::writer::BACKEND_DIRECT_SERVE;

/// One encoder invocation producing one derivative file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionStep {
    /// Encoder name; `"copy"` passes the original through unchanged.
    pub encoder: String,
    pub width: u32,
    /// Height. Kept as `length` for wire compatibility: sizes arrive as
    /// `[width, length]` but filenames render length before width.
    pub length: u32,
    pub quality: u32,
    pub speed: u32,
}

/// One storage-backend target; each writer uploads every produced file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriterStep {
    /// Backend name, e.g. "s3", "gcs", "sftp", "direct_serve".
    pub backend: String,
    /// Opaque credentials forwarded to the backend.
    pub credentials: HashMap<String, String>,
}

/// The fully resolved job: ordered conversions and writers plus callback
/// and metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CombinedJob {
    pub conversions: Vec<ConversionStep>,
    pub writers: Vec<WriterStep>,
    /// Empty when no callback is configured.
    pub callback_url: String,
    pub callback_headers: HashMap<String, String>,
    pub priority: i32,
    pub keep_original: bool,
    pub sub_dir: String,
}

impl CombinedJob {
    /// Build the combined job from verified token claims.
    ///
    /// Every size of every format becomes one conversion step; every
    /// storage key becomes one writer step; `direct_host` appends the
    /// direct-serve writer and `keep_original` appends a trailing `copy`
    /// conversion.
    pub fn from_spec(spec: &JobSpec) -> Result<Self> {
        let mut conversions = Vec::new();
        let mut writers = Vec::new();

        for (format, format_spec) in &spec.formats {
            for size in &format_spec.sizes {
                let (width, length) = match size.as_slice() {
                    [n] => (*n, *n),
                    [w, l] => (*w, *l),
                    _ => {
                        return Err(Error::request(format!(
                            "invalid size specification: {:?}",
                            size
                        )))
                    }
                };
                conversions.push(ConversionStep {
                    encoder: format.clone(),
                    width,
                    length,
                    quality: format_spec.settings.quality,
                    speed: format_spec.settings.speed,
                });
            }
        }

        for (backend, key) in &spec.storage {
            writers.push(WriterStep {
                backend: backend.clone(),
                credentials: HashMap::from([("key".to_string(), key.clone())]),
            });
        }

        if spec.direct_host {
            writers.push(WriterStep {
                backend: BACKEND_DIRECT_SERVE.to_string(),
                credentials: HashMap::new(),
            });
        }

        if spec.keep_original {
            conversions.push(ConversionStep {
                encoder: "copy".to_string(),
                width: 0,
                length: 0,
                quality: 100,
                speed: 0,
            });
        }

        Ok(Self {
            conversions,
            writers,
            callback_url: spec.completion_callback.clone(),
            callback_headers: spec.callback_headers.clone(),
            priority: spec.priority,
            keep_original: spec.keep_original,
            sub_dir: spec.sub_dir.clone(),
        })
    }
}

/// Split a filename into stem and extension around the last dot.
fn split_filename(original: &str) -> (&str, &str) {
    match original.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (original, ""),
    }
}

/// File extension of a derivative produced by the named encoder.
pub fn extension_for_encoder(encoder: &str) -> &str {
    match encoder {
        "jpeg" | "jpg" => "jpg",
        "png" => "png",
        "webp" => "webp",
        "avif" => "avif",
        other => other,
    }
}

/// Deterministic output filename for one conversion step.
///
/// Copy steps keep the original extension; encoded derivatives render the
/// length before the width even though the struct stores width first. The
/// asymmetry is load-bearing: callers derive URLs from these names.
pub fn output_filename(hash: &str, original: &str, step: &ConversionStep) -> String {
    let (stem, ext) = split_filename(original);
    if step.encoder == "copy" {
        format!("{}_{}.{}", hash, stem, ext)
    } else {
        format!(
            "{}_{}_{}_{}_.{}",
            hash,
            stem,
            step.length,
            step.width,
            extension_for_encoder(&step.encoder)
        )
    }
}

/// The filenames a job is expected to produce, in conversion order.
pub fn expected_files(hash: &str, original: &str, conversions: &[ConversionStep]) -> Vec<String> {
    conversions
        .iter()
        .map(|step| output_filename(hash, original, step))
        .collect()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Distinct dimension pairs (or encoders) must never collide in the
        // derived filename for a fixed hash and original name.
        #[test]
        fn prop_filenames_injective_across_dimensions(
            w1 in 1u32..5000, l1 in 1u32..5000,
            w2 in 1u32..5000, l2 in 1u32..5000,
        ) {
            prop_assume!((w1, l1) != (w2, l2));
            let a = output_filename("h", "img.png", &ConversionStep {
                encoder: "webp".to_string(), width: w1, length: l1, quality: 80, speed: 1,
            });
            let b = output_filename("h", "img.png", &ConversionStep {
                encoder: "webp".to_string(), width: w2, length: l2, quality: 80, speed: 1,
            });
            prop_assert_ne!(a, b);
        }

        #[test]
        fn prop_expected_files_len_matches_conversions(n in 0usize..8) {
            let conversions: Vec<ConversionStep> = (0..n)
                .map(|i| ConversionStep {
                    encoder: "jpg".to_string(),
                    width: 100 + i as u32,
                    length: 200 + i as u32,
                    quality: 80,
                    speed: 1,
                })
                .collect();
            let files = expected_files("h", "a.jpg", &conversions);
            prop_assert_eq!(files.len(), n);
        }
    }
}

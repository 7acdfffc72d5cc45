//! Upload-token verification.
//!
//! Upload requests carry an HS256 JWT whose `job` claim embeds the full job
//! specification: output formats with sizes, storage-backend keys, the
//! direct-host flag, and callback configuration.

use std::collections::{BTreeMap, HashMap};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Verified claims of an upload token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadClaims {
    /// Token issuer.
    #[serde(default)]
    pub iss: String,
    /// Token subject, e.g. "upload-job".
    #[serde(default)]
    pub sub: String,
    /// Issued-at timestamp (Unix).
    #[serde(default)]
    pub iat: i64,
    /// Expiration timestamp (Unix).
    pub exp: i64,
    /// The job specification.
    pub job: JobSpec,
}

/// Job specification carried in the token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// URL notified on completion, empty when no callback is wanted.
    #[serde(default)]
    pub completion_callback: String,
    /// Extra headers sent with the completion callback.
    #[serde(default)]
    pub callback_headers: HashMap<String, String>,
    /// 0 = realtime, 1 = queued.
    #[serde(default)]
    pub priority: i32,
    /// Keep the uploaded original alongside the derivatives.
    #[serde(default)]
    pub keep_original: bool,
    /// Requested output formats, e.g. "jpg", "webp".
    #[serde(default)]
    pub formats: BTreeMap<String, FormatSpec>,
    /// Storage-backend name to credentials access key.
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
    /// Serve results via the built-in HTTP file tree.
    #[serde(default)]
    pub direct_host: bool,
    /// Logical sub-directory for published files.
    #[serde(default)]
    pub sub_dir: String,
}

/// Per-format encoding specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatSpec {
    #[serde(default)]
    pub settings: FormatSettings,
    /// Requested sizes: `[N]` means N×N, `[W, H]` means width W, length H.
    #[serde(default)]
    pub sizes: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatSettings {
    /// 1–100 for lossy formats.
    #[serde(default)]
    pub quality: u32,
    /// Encoder speed/efficiency tradeoff.
    #[serde(default)]
    pub speed: u32,
}

/// Verifier for upload tokens signed with the shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl TokenVerifier {
    /// Create a verifier from the shared secret.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Verify a token and extract its claims.
    pub fn verify(&self, token: &str) -> Result<UploadClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;

        decode::<UploadClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::auth("token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Error::auth("invalid token signature")
                }
                _ => Error::auth(format!("invalid token: {}", e)),
            })
    }

    /// Sign a token for the given job specification.
    ///
    /// Used by the issuing side and by tests; the server itself only
    /// verifies.
    pub fn sign(&self, job: JobSpec, ttl_secs: i64) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = UploadClaims {
            iss: "imagemill.issuer".to_string(),
            sub: "upload-job".to_string(),
            iat: now,
            exp: now + ttl_secs,
            job,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::auth(format!("failed to sign token: {}", e)))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Result<&str> {
    header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::auth("invalid authorization header format"))
}

//! Storage-backend writers.
//!
//! Dispatch is tagged by backend name over a fixed set of variants. Every
//! writer consumes its byte stream exactly once and checks for cancellation
//! at I/O boundaries; partial writes to earlier backends are never rolled
//! back.

mod direct_serve;
mod gcs;
mod s3;
mod sftp;

pub use direct_serve::write_direct_serve;
pub use gcs::write_gcs;
pub use s3::write_s3;
pub use sftp::write_sftp;

use std::collections::HashMap;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// String-keyed bag of credentials plus execution-time context.
///
/// Always contains `filename` and `folder`; the direct-serve backend also
/// receives `baseDir` (the server-level serve root).
pub type AccessInfo = HashMap<String, String>;

/// Backend name of the direct-serve writer.
pub const BACKEND_DIRECT_SERVE: &str = "direct_serve";

/// Write one file to the named backend.
pub async fn dispatch_write(
    cancel: &CancellationToken,
    backend: &str,
    access: &AccessInfo,
    reader: File,
) -> Result<()> {
    match backend {
        BACKEND_DIRECT_SERVE => write_direct_serve(cancel, access, reader).await,
        "s3" => write_s3(cancel, access, reader).await,
        "gcs" => write_gcs(cancel, access, reader).await,
        "sftp" => write_sftp(cancel, access, reader).await,
        other => Err(Error::writer(format!("unknown backend type: {}", other))),
    }
}

/// Required access-info value, or a writer error naming the missing key.
pub(crate) fn required<'a>(access: &'a AccessInfo, key: &str) -> Result<&'a str> {
    access
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::writer(format!("missing required access info key: {}", key)))
}

/// Join the logical folder and filename into a POSIX-style object key.
pub(crate) fn object_key(access: &AccessInfo) -> Result<String> {
    let filename = required(access, "filename")?;
    let folder = access.get("folder").map(String::as_str).unwrap_or("");
    if folder.is_empty() {
        Ok(filename.to_string())
    } else {
        Ok(format!("{}/{}", folder.trim_matches('/'), filename))
    }
}

/// Drain the byte stream into memory, aborting if the token fires mid-read.
pub(crate) async fn read_all(cancel: &CancellationToken, mut reader: File) -> Result<Bytes> {
    let mut buf = Vec::new();
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        read = reader.read_to_end(&mut buf) => {
            read.map_err(|e| Error::writer(format!("failed to read source file: {}", e)))?;
            Ok(Bytes::from(buf))
        }
    }
}

//! S3-compatible object-store writer.

use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{object_key, read_all, required, AccessInfo};
use crate::error::{Error, Result};

/// Upload the stream to an S3-compatible bucket.
///
/// Expects `accessKey`, `secretKey` and `bucket` in the access info;
/// `region` defaults to `us-east-1` and a custom `endpoint` switches the
/// writer to any S3-compatible service.
pub async fn write_s3(
    cancel: &CancellationToken,
    access: &AccessInfo,
    reader: File,
) -> Result<()> {
    let bucket = required(access, "bucket")?;
    let access_key = required(access, "accessKey")?;
    let secret_key = required(access, "secretKey")?;
    let region = access
        .get("region")
        .map(String::as_str)
        .filter(|r| !r.is_empty())
        .unwrap_or("us-east-1");

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(region)
        .with_access_key_id(access_key)
        .with_secret_access_key(secret_key);

    if let Some(endpoint) = access.get("endpoint").filter(|e| !e.is_empty()) {
        builder = builder
            .with_endpoint(endpoint.clone())
            .with_allow_http(endpoint.starts_with("http://"));
    }

    let store = builder
        .build()
        .map_err(|e| Error::writer(format!("failed to build S3 client: {}", e)))?;

    let key = object_key(access)?;
    let payload = PutPayload::from(read_all(cancel, reader).await?);
    let location = ObjectPath::from(key.as_str());

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        put = store.put(&location, payload) => {
            put.map_err(|e| {
                Error::writer(format!("failed to upload object {} to bucket {}: {}", key, bucket, e))
            })?;
            info!("Uploaded object '{}' to bucket '{}'", key, bucket);
            Ok(())
        }
    }
}

//! Google Cloud Storage writer.

use base64::Engine;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{object_key, read_all, required, AccessInfo};
use crate::error::{Error, Result};

/// Upload the stream to a GCS bucket.
///
/// Expects `bucket` and `credentialsJSON` (a service-account key, base64 or
/// raw JSON) in the access info.
pub async fn write_gcs(
    cancel: &CancellationToken,
    access: &AccessInfo,
    reader: File,
) -> Result<()> {
    let bucket = required(access, "bucket")?;
    let raw_credentials = required(access, "credentialsJSON")?;

    let service_account_key = match base64::engine::general_purpose::STANDARD.decode(raw_credentials)
    {
        Ok(decoded) => String::from_utf8(decoded)
            .map_err(|e| Error::writer(format!("service account key is not UTF-8: {}", e)))?,
        Err(_) => raw_credentials.to_string(),
    };

    let store = GoogleCloudStorageBuilder::new()
        .with_bucket_name(bucket)
        .with_service_account_key(service_account_key)
        .build()
        .map_err(|e| Error::writer(format!("failed to build GCS client: {}", e)))?;

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

//! SFTP writer.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{read_all, required, AccessInfo};
use crate::error::{Error, Result};

/// SSH connect/handshake timeout.
const SFTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upload the stream to a remote host over SFTP.
///
/// Expects `host`, `user` and `remotePath` in the access info, plus either
/// `password` or `privateKey` (base64 or raw PEM); `port` defaults to 22.
/// The remote target is `<remotePath>/<folder>/<filename>`, with missing
/// directories created segment by segment.
pub async fn write_sftp(
    cancel: &CancellationToken,
    access: &AccessInfo,
    reader: File,
) -> Result<()> {
    let host = required(access, "host")?.to_string();
    let user = required(access, "user")?.to_string();
    let remote_root = required(access, "remotePath")?.to_string();
    let filename = required(access, "filename")?.to_string();
    let port: u16 = access
        .get("port")
        .filter(|p| !p.is_empty())
        .map(|p| p.parse())
        .transpose()
        .map_err(|e| Error::writer(format!("invalid sftp port: {}", e)))?
        .unwrap_or(22);
    let folder = access.get("folder").cloned().unwrap_or_default();
    let password = access.get("password").cloned().filter(|p| !p.is_empty());
    let private_key = access.get("privateKey").cloned().filter(|k| !k.is_empty());

    if password.is_none() && private_key.is_none() {
        return Err(Error::writer(
            "no auth method provided; set password or privateKey in access info",
        ));
    }

    let data = read_all(cancel, reader).await?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let remote_path = join_remote(&remote_root, &folder, &filename);

    // The ssh2 session is blocking; run the whole transfer on the blocking
    // pool. Cancellation is only observed up to this point.
    let uploaded_path = remote_path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let addr = format!("{}:{}", host, port);
        let tcp = TcpStream::connect(&addr)
            .map_err(|e| Error::writer(format!("dial tcp {}: {}", addr, e)))?;
        tcp.set_read_timeout(Some(SFTP_TIMEOUT)).ok();
        tcp.set_write_timeout(Some(SFTP_TIMEOUT)).ok();

        let mut session = ssh2::Session::new()
            .map_err(|e| Error::writer(format!("failed to create ssh session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| Error::writer(format!("ssh handshake with {}: {}", addr, e)))?;

        if let Some(key) = private_key {
            let pem = match base64::engine::general_purpose::STANDARD.decode(&key) {
                Ok(decoded) => String::from_utf8(decoded)
                    .map_err(|e| Error::writer(format!("private key is not UTF-8: {}", e)))?,
                Err(_) => key,
            };
            session
                .userauth_pubkey_memory(&user, None, &pem, None)
                .map_err(|e| Error::writer(format!("private key auth failed: {}", e)))?;
        } else if let Some(pass) = password {
            session
                .userauth_password(&user, &pass)
                .map_err(|e| Error::writer(format!("password auth failed: {}", e)))?;
        }

        let sftp = session
            .sftp()
            .map_err(|e| Error::writer(format!("failed to create sftp channel: {}", e)))?;

        if let Some(parent) = Path::new(&remote_path).parent() {
            mkdir_all_sftp(&sftp, parent)?;
        }

        let mut remote_file = sftp
            .create(Path::new(&remote_path))
            .map_err(|e| Error::writer(format!("create remote file {}: {}", remote_path, e)))?;
        remote_file
            .write_all(&data)
            .map_err(|e| Error::writer(format!("copy to remote file {}: {}", remote_path, e)))?;

        Ok(())
    })
    .await
    .map_err(|e| Error::writer(format!("sftp task panicked: {}", e)))??;

    info!("Uploaded '{}' via sftp", uploaded_path);
    Ok(())
}

/// Join remote path segments POSIX-style, skipping empty pieces.
fn join_remote(root: &str, folder: &str, filename: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in [root, folder, filename] {
        let trimmed = segment.trim_matches('/');
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    let joined = parts.join("/");
    if root.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Create each missing segment of a remote directory path.
fn mkdir_all_sftp(sftp: &ssh2::Sftp, dir: &Path) -> Result<()> {
    let mut current = std::path::PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if current.as_os_str().is_empty() || current == Path::new("/") {
            continue;
        }
        if sftp.stat(&current).is_err() {
            sftp.mkdir(&current, 0o755)
                .map_err(|e| Error::writer(format!("mkdir {}: {}", current.display(), e)))?;
        }
    }
    Ok(())
}

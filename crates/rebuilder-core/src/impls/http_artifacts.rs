//! HttpArtifactStore - stream RPMs from the upstream package store
//!
//! The body is written to `<dest>.part` and renamed into place once complete,
//! so a half-downloaded file never carries the final name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::ports::{ArtifactStore, FetchError};

pub struct HttpArtifactStore {
    client: reqwest::Client,
}

impl HttpArtifactStore {
    /// `read_timeout` bounds each read of the body, not the whole transfer.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let part = partial_path(dest);
        let bytes = match write_part(&part, &mut response, url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    debug!(path = %part.display(), error = %rm, "could not remove partial file");
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&part, dest).await?;

        debug!(url, bytes, "downloaded");
        Ok(())
    }
}

async fn write_part(
    part: &Path,
    response: &mut reqwest::Response,
    url: &str,
) -> Result<usize, FetchError> {
    let mut file = tokio::fs::File::create(part).await?;
    let mut bytes = 0usize;
    while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
        file.write_all(&chunk).await?;
        bytes += chunk.len();
    }
    file.flush().await?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn partial_file_sits_next_to_destination() {
        let part = partial_path(Path::new("/tmp/rpms/r/r-1-1.noarch.rpm"));
        assert_eq!(part, PathBuf::from("/tmp/rpms/r/r-1-1.noarch.rpm.part"));
    }

    #[tokio::test]
    async fn unreachable_store_is_a_request_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = HttpArtifactStore::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        let dest = dir.path().join("x.rpm");

        let err = store.download("http://127.0.0.1:9/x.rpm", &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. } | FetchError::Timeout(_)));
        assert!(!dest.exists());
    }

    /// Promises 1000 bytes, sends a few, hangs up.
    async fn truncating_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\npartial")
                .await
                .unwrap();
        });
        format!("http://{addr}/x.rpm")
    }

    #[tokio::test]
    async fn cut_off_body_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HttpArtifactStore::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        let dest = dir.path().join("x.rpm");
        let url = truncating_server().await;

        let err = store.download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }), "{err:?}");
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}

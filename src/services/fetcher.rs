//! Playlist download to the local snapshot file

use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::sleep;

use crate::config::Config;

const MAX_BACKOFF_MS: u64 = 10_000;

/// Why a download did not produce a snapshot
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, TLS, connect, timeout or body stream failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response
    #[error("HTTP {code}: {reason}")]
    Status { code: u16, reason: String },
    #[error("Playlist too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
    #[error("Failed to write snapshot {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Network failures, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status { code, .. } => {
                *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || *code >= 500
            }
            FetchError::TooLarge { .. } | FetchError::Io { .. } => false,
        }
    }

    fn from_status(status: StatusCode) -> Self {
        FetchError::Status {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Erro").to_string(),
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Summary of a successful download
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub bytes: u64,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Downloads the source playlist into the snapshot file
pub struct PlaylistFetcher {
    client: Client,
    max_retries: u32,
    max_bytes: u64,
}

/// Sibling path the body is streamed into before the final rename
fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn backoff_for(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(factor.saturating_mul(500).min(MAX_BACKOFF_MS))
}

impl PlaylistFetcher {
    pub fn new(
        user_agent: &str,
        timeout_ms: u64,
        max_retries: u32,
        max_bytes: u64,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_retries,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            &config.user_agent,
            config.fetch_timeout_ms,
            config.max_retries,
            config.max_m3u_bytes(),
        )
    }

    /// Download `url` into `dest`, replacing it only once the whole body is on disk.
    ///
    /// On error `dest` is left exactly as it was before the call.
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchReport, FetchError> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.try_fetch(url, dest).await {
                Ok(bytes) => {
                    return Ok(FetchReport {
                        bytes,
                        attempts: attempt + 1,
                        elapsed: started.elapsed(),
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "fetch_retry" = attempt + 1,
                        "backoff_ms" = backoff.as_millis() as u64,
                        "error" = %err
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge {
                    size: len,
                    limit: self.max_bytes,
                });
            }
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let tmp_path = temp_path_for(dest);
        match self.write_body(response, &tmp_path).await {
            Ok(bytes) => {
                fs::rename(&tmp_path, dest)
                    .await
                    .map_err(|e| FetchError::io(dest, e))?;
                Ok(bytes)
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }

    /// Stream the body into `path`, then flush and sync it
    async fn write_body(&self, response: Response, path: &Path) -> Result<u64, FetchError> {
        let file = File::create(path).await.map_err(|e| FetchError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let mut written = 0u64;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchError::TooLarge {
                    size: written,
                    limit: self.max_bytes,
                });
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(path, e))?;
        }

        writer.flush().await.map_err(|e| FetchError::io(path, e))?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| FetchError::io(path, e))?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BODY: &str = "#EXTM3U\n#EXTINF:-1,Band\nhttp://stream/band\n";

    async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> (AxumStatus, &'static str) {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            (AxumStatus::SERVICE_UNAVAILABLE, "try later")
        } else {
            (AxumStatus::OK, BODY)
        }
    }

    async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/br.m3u", get(|| async { BODY }))
            .route("/missing.m3u", get(|| async { (AxumStatus::NOT_FOUND, "nope") }))
            .route("/huge.m3u", get(|| async { "x".repeat(4096) }))
            .route("/flaky.m3u", get(flaky))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, hits)
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path_for(Path::new("/data/lista_brasil.m3u"));
        assert_eq!(tmp, PathBuf::from("/data/lista_brasil.m3u.tmp"));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_for(0), Duration::from_millis(500));
        assert_eq!(backoff_for(2), Duration::from_millis(2000));
        assert_eq!(backoff_for(10), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_for(200), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(FetchError::from_status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(FetchError::from_status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!FetchError::from_status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!FetchError::TooLarge { size: 2, limit: 1 }.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_writes_exact_body() {
        let (addr, _) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lista.m3u");
        std::fs::write(&dest, "stale content that is longer than the new body, to check truncation").unwrap();

        let fetcher = PlaylistFetcher::new("test", 5_000, 0, 1024 * 1024).unwrap();
        let report = fetcher
            .fetch_to_file(&format!("http://{}/br.m3u", addr), &dest)
            .await
            .unwrap();

        assert_eq!(report.bytes, BODY.len() as u64);
        assert_eq!(report.attempts, 1);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), BODY);
        assert!(!temp_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn test_non_success_status_keeps_previous_snapshot() {
        let (addr, _) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lista.m3u");
        std::fs::write(&dest, BODY).unwrap();

        let fetcher = PlaylistFetcher::new("test", 5_000, 2, 1024 * 1024).unwrap();
        let err = fetcher
            .fetch_to_file(&format!("http://{}/missing.m3u", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { code: 404, .. }));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (addr, _) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lista.m3u");

        let fetcher = PlaylistFetcher::new("test", 5_000, 0, 1024).unwrap();
        let err = fetcher
            .fetch_to_file(&format!("http://{}/huge.m3u", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
        assert!(!dest.exists());
        assert!(!temp_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn test_retries_after_server_error() {
        let (addr, hits) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("lista.m3u");

        let fetcher = PlaylistFetcher::new("test", 5_000, 1, 1024 * 1024).unwrap();
        let report = fetcher
            .fetch_to_file(&format!("http://{}/flaky.m3u", addr), &dest)
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_previous_snapshot() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n#EXTM3U\n#EXTINF:-1,Band\n")
                .await
                .unwrap();
            // Connection drops well short of the advertised length
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lista.m3u");
        std::fs::write(&dest, "OLD").unwrap();

        let fetcher = PlaylistFetcher::new("test", 5_000, 0, 1024 * 1024).unwrap();
        let err = fetcher
            .fetch_to_file(&format!("http://{}/br.m3u", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "OLD");
        assert!(!temp_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lista.m3u");
        let fetcher = PlaylistFetcher::new("test", 2_000, 0, 1024).unwrap();
        let err = fetcher
            .fetch_to_file(&format!("http://{}/br.m3u", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert!(!dest.exists());
    }
}

//! InMemoryArtifactStore - artifact store double that writes placeholder files

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{ArtifactStore, FetchError};

#[derive(Default)]
struct State {
    downloads: Vec<String>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

/// Records every requested URL and writes a small file at the destination.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    state: Mutex<State>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// URLs containing `fragment` answer 404.
    pub fn fail_url(&self, fragment: &str) {
        self.with_state(|s| s.failing.push(fragment.to_string()))
    }

    /// Every download waits this long first.
    pub fn set_delay(&self, delay: Duration) {
        self.with_state(|s| s.delay = Some(delay))
    }

    pub fn downloads(&self) -> Vec<String> {
        self.with_state(|s| s.downloads.clone())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let (delay, fails) = self.with_state(|s| {
            s.downloads.push(url.to_string());
            (s.delay, s.failing.iter().any(|f| url.contains(f.as_str())))
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        tokio::fs::write(dest, url.as_bytes()).await?;
        Ok(())
    }
}

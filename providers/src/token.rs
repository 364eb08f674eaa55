//! Credential acquisition.
//!
//! The credential is written by something outside this process (a login flow,
//! another tool) into a [`CredentialStore`]. [`TokenProvider::acquire`] waits until
//! it shows up. Absence is not an error, so there is nothing to retry: the wait is
//! simply resumed. Stores that can signal changes wake the waiter immediately;
//! the polling interval is the fallback for stores that cannot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tally_types::Credential;
use thiserror::Error;
use tokio::sync::Notify;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Read-only lookup of the serialized token object.
pub trait CredentialStore: Send + Sync {
    /// The serialized token, if one has been stored.
    fn load(&self) -> Option<String>;

    /// Signalled whenever the stored value changes, for stores that support it.
    fn change_notifier(&self) -> Option<Arc<Notify>> {
        None
    }
}

/// Token object kept in a JSON file, e.g. `~/.tally/token.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), "Credential file unreadable: {e}");
                None
            }
        }
    }
}

/// In-process store that notifies waiters on every write.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
    notify: Arc<Notify>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, raw: impl Into<String>) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.into());
        self.notify.notify_waiters();
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn change_notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn load(&self) -> Option<String> {
        (**self).load()
    }

    fn change_notifier(&self) -> Option<Arc<Notify>> {
        (**self).change_notifier()
    }
}

#[derive(Debug, Error)]
#[error("no credential became available within {}s", .waited.as_secs_f64())]
pub struct CredentialTimeout {
    pub waited: Duration,
}

/// Waits for a usable credential in a [`CredentialStore`].
#[derive(Debug)]
pub struct TokenProvider<S> {
    store: S,
    poll_interval: Duration,
}

impl<S: CredentialStore> TokenProvider<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait until a credential is available. May never return.
    pub async fn acquire(&self) -> Credential {
        let notifier = self.store.change_notifier();
        let mut announced = false;
        let mut last_rejected: Option<String> = None;

        loop {
            // Register interest before reading so a write in between is not missed.
            let mut notified = notifier.as_deref().map(|notify| Box::pin(notify.notified()));
            if let Some(notified) = notified.as_mut() {
                notified.as_mut().enable();
            }

            if let Some(raw) = self.store.load() {
                match Credential::from_json(&raw) {
                    Ok(credential) => {
                        tracing::debug!("Credential acquired");
                        return credential;
                    }
                    Err(e) => {
                        if last_rejected.as_deref() != Some(raw.as_str()) {
                            tracing::warn!("Ignoring unusable stored credential: {e}");
                            last_rejected = Some(raw);
                        }
                    }
                }
            }

            if !announced {
                tracing::info!(
                    poll_ms = self.poll_interval.as_millis(),
                    "Waiting for a credential to become available"
                );
                announced = true;
            }

            match notified {
                Some(notified) => {
                    let _ = tokio::time::timeout(self.poll_interval, notified).await;
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `ceiling`.
    pub async fn acquire_within(&self, ceiling: Duration) -> Result<Credential, CredentialTimeout> {
        tokio::time::timeout(ceiling, self.acquire())
            .await
            .map_err(|_| CredentialTimeout { waited: ceiling })
    }
}

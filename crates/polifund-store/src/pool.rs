//! Shared, explicitly lifecycled handle to the [`Database`].
//!
//! The connection is opened once at startup, shared by cloning the pool
//! and released with [`StorePool::close`]. Queries run on tokio's
//! blocking pool so async handlers never block on SQLite.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct StorePool {
    inner: Arc<Mutex<Option<Database>>>,
}

impl StorePool {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(db))),
        }
    }

    /// Run `f` against the database on the blocking thread pool.
    pub async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| StoreError::Task("store lock poisoned".into()))?;
            let db = guard.as_ref().ok_or(StoreError::Closed)?;
            f(db)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Close the connection. Later calls to [`StorePool::run`] fail with
    /// [`StoreError::Closed`]. Returns whether this call closed it.
    pub fn close(&self) -> bool {
        let closed = match self.inner.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if closed {
            tracing::info!("metadata store closed");
        }
        closed
    }
}

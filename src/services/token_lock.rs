use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Per-upload-token mutual exclusion.
///
/// Entries are created on demand and dropped again once nobody holds or waits
/// on them, so unknown tokens do not accumulate.
#[derive(Debug, Default, Clone)]
pub struct TokenLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl TokenLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, token: &str) -> TokenGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(token.to_string()).or_default().clone()
        };

        TokenGuard {
            guard: Some(lock.lock_owned().await),
            token: token.to_string(),
            locks: self.locks.clone(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct TokenGuard {
    guard: Option<OwnedMutexGuard<()>>,
    token: String,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.token)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.token);
        }
    }
}

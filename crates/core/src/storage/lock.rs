use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// In-process mutual exclusion keyed by output location. Jobs that reset the same directory
/// are serialized; jobs on different keys run concurrently.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on so the map does not grow with every date.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let locks = KeyedLocks::new();
        let guard = locks.lock("GC/2025-01-01").await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), locks.lock("GC/2025-01-01")).await;
        assert!(blocked.is_err());

        drop(guard);
        let acquired =
            tokio::time::timeout(Duration::from_millis(200), locks.lock("GC/2025-01-01")).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _gc = locks.lock("GC/2025-01-01").await;
        let si = tokio::time::timeout(Duration::from_millis(200), locks.lock("SI/2025-01-01")).await;
        assert!(si.is_ok());
    }
}

use crate::domain::{DateKey, FeatureKey};
use crate::job::bulk::run_extraction_all;
use crate::job::error::ExtractionFailure;
use crate::job::single::{run_extraction, Extraction};
use crate::storage::{KeyedLocks, RawLayout, BULK_DIR_NAME};
use crate::store::RemoteStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs extraction jobs against one remote store and one raw root, serializing jobs that target
/// the same output directory.
pub struct Extractor {
    store: Arc<dyn RemoteStore>,
    layout: RawLayout,
    locks: KeyedLocks,
}

impl Extractor {
    pub fn new(store: Arc<dyn RemoteStore>, layout: RawLayout) -> Self {
        Self {
            store,
            layout,
            locks: KeyedLocks::new(),
        }
    }

    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    pub async fn extract(
        &self,
        date: &DateKey,
        feature: &FeatureKey,
    ) -> Result<Extraction, ExtractionFailure> {
        let _guard = self.locks.lock(&format!("{feature}/{date}")).await;
        run_extraction(self.store.as_ref(), date, feature, &self.layout).await
    }

    pub async fn extract_all(&self) -> Result<Vec<PathBuf>, ExtractionFailure> {
        let _guard = self.locks.lock(BULK_DIR_NAME).await;
        run_extraction_all(self.store.as_ref(), &self.layout).await
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("store", &self.store.store_name())
            .field("root", &self.layout.root())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ExtractionStatus;
    use crate::store::InMemoryStore;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Holds each read open for a while and records how many reads overlapped.
    #[derive(Default)]
    struct SlowStore {
        inner: InMemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RemoteStore for SlowStore {
        fn store_name(&self) -> &'static str {
            "slow"
        }

        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get(&self, path: &str) -> anyhow::Result<Option<Value>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.get(path).await
        }
    }

    fn slow_extractor(root: &std::path::Path) -> (Arc<Extractor>, Arc<SlowStore>) {
        let store = Arc::new(SlowStore {
            inner: InMemoryStore::new(json!({
                "historical_prices": {"2025-10-14": {
                    "GC": {"Close": 2000.0},
                    "SI": {"Close": 24.0}
                }}
            })),
            ..Default::default()
        });
        let extractor = Extractor::new(store.clone(), RawLayout::new(root));
        (Arc::new(extractor), store)
    }

    async fn run_both(extractor: &Arc<Extractor>, a: &str, b: &str) -> (Extraction, Extraction) {
        let date = DateKey::parse("2025-10-14").unwrap();
        let spawn = |feature: &str| {
            let extractor = extractor.clone();
            let date = date.clone();
            let feature = FeatureKey::parse(feature).unwrap();
            tokio::spawn(async move { extractor.extract(&date, &feature).await })
        };
        let (first, second) = (spawn(a), spawn(b));
        (first.await.unwrap().unwrap(), second.await.unwrap().unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_for_one_key_never_overlap() {
        let tmp = tempfile::tempdir().unwrap();
        let (extractor, store) = slow_extractor(tmp.path());

        let (a, b) = run_both(&extractor, "gc", "GC").await;

        assert_eq!(store.peak.load(Ordering::SeqCst), 1);
        assert_eq!(a.path, b.path);
        assert_eq!(a.status, ExtractionStatus::Saved);
        let dir = a.path.parent().unwrap();
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_for_different_keys_proceed_together() {
        let tmp = tempfile::tempdir().unwrap();
        let (extractor, store) = slow_extractor(tmp.path());

        let (gc, si) = run_both(&extractor, "GC", "SI").await;

        assert_eq!(store.peak.load(Ordering::SeqCst), 2);
        assert_ne!(gc.path, si.path);
        assert!(gc.path.is_file() && si.path.is_file());
    }
}

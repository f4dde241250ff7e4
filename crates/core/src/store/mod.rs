pub mod firebase;
pub mod memory;

use anyhow::Result;
use serde_json::Value;

pub use firebase::FirebaseClient;
pub use memory::InMemoryStore;

/// Remote node that holds one object per date, each keyed by feature.
pub const HISTORICAL_PRICES_PATH: &str = "historical_prices";

/// Read access to a hierarchical JSON store addressed by slash-separated paths.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    fn store_name(&self) -> &'static str;

    /// Loads credentials and prepares the client. Calling it again after success is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Returns the value stored at `path`, or `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;
}

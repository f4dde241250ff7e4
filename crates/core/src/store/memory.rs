use crate::store::RemoteStore;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// A static JSON tree served through [`RemoteStore`]. Backs offline runs from a fixture file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    root: Value,
}

impl InMemoryStore {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let root = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("fixture {} is not valid JSON", path.display()))?;
        Ok(Self::new(root))
    }

    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.as_object()?.get(segment)?;
        }
        if node.is_null() {
            return None;
        }
        Some(node)
    }
}

#[async_trait::async_trait]
impl RemoteStore for InMemoryStore {
    fn store_name(&self) -> &'static str {
        "in_memory"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.lookup(path).cloned())
    }
}

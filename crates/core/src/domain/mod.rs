pub mod keys;

pub use keys::{DateKey, FeatureKey};

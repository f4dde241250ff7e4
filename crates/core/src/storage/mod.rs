pub mod files;
pub mod layout;
pub mod lock;

pub use layout::{is_reserved_feature, RawLayout, BULK_DIR_NAME};
pub use lock::KeyedLocks;

//! Configuration system.
//!
//! A typed [`Config`] tree lives in one [`ConfigStore`]. It starts as the
//! built-in defaults deep-merged with the persisted document, and changes only
//! through [`ConfigStore::apply`].
//!
//! ## Merge Strategy
//! - Mappings merge key by key, recursively
//! - Lists, scalars and nulls replace wholesale
//! - Keys a patch does not mention are left alone
//!
//! ## Persisted Format
//! JSON by default; YAML when the file name ends in `.yaml` or `.yml`.

mod merge;
mod store;
mod types;

pub use merge::deep_merge;
pub use store::{ApplyOutcome, ConfigPatch, ConfigStore, PersistHealth};
pub use types::*;

//! services/api/src/adapters/mod.rs
//!
//! Concrete implementations of the `StateStore` port: the Postgres primary,
//! the local-file fallback, and the wrapper that degrades from one to the
//! other.

pub mod fallback;
pub mod file;
pub mod pg;

use foyer_core::domain::AppData;
use foyer_core::migrate;
use foyer_core::ports::{PortError, PortResult};
use serde_json::Value;

/// Decodes a stored raw document, running the one-time schema upgrade.
/// Shared by every backend so legacy shapes are promoted no matter where
/// they were read from.
pub(crate) fn decode_document(raw: Value) -> PortResult<AppData> {
    migrate::upgrade(raw).map_err(|e| PortError::Unexpected(e.to_string()))
}

//! TestGen Store - durable engine state
//!
//! The fingerprint store is the only durable artifact the engine owns:
//! a persistent mapping from unit identity to its last-known fingerprint
//! and the accepted [`TestRecord`]s covering it. The on-disk layout is
//! one JSON file per identity, committed atomically, so a second
//! invocation can read the store while another writes it.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod record;
pub mod store;

pub use error::StoreError;
pub use record::{StoredEntry, TestRecord};
pub use store::FingerprintStore;

//! Event Calendar Core Library
//!
//! This library keeps the per-user set of committed calendar entries for the
//! event discovery app: conflict detection, recurrence expansion and
//! key-value persistence of the commitment index.

pub mod catalog;
pub mod config;
pub mod conflict;
pub mod error;
pub mod ics;
pub mod index;
pub mod manager;
pub mod recurrence;
pub mod service;
pub mod storage;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        catalog::*, config::*, conflict::*, ics::*, index::*, manager::*, recurrence::*,
        service::*, storage::*, types::*,
    };
}

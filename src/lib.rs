//! Incremental, resumable multiple sequence alignment per named selection.
//!
//! Each selection keeps a ledger of the record ids already aligned. A fetched
//! batch is filtered against the selection and the ledger; only the new
//! records are handed to the aligner, which either builds an alignment from
//! scratch or adds them to the newest existing one.

pub mod about;
pub mod aligner;
pub mod artifacts;
pub mod config;
pub mod driver;
pub mod error;
mod external;
pub mod fetch;
pub mod filters;
pub mod ledger;
pub mod orchestrator;
pub mod phylogeny;
pub mod run_id;
pub mod selections;
pub mod selector;

pub use covphylo_protocol as protocol;
pub use error::{AlignError, Result};

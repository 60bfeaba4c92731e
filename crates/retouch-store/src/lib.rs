//! retouch-store: Which image a path was derived from, and how.
//!
//! Tracks two mappings, derived path -> root path and path -> filter
//! chain, and answers the questions the editor asks of them:
//!
//! - [`DerivationStore::record_derivation`]: a filter was applied.
//! - [`DerivationStore::resolve_root`]: which image to replay from.
//! - [`DerivationStore::chain_for`]: which filters to replay.
//! - [`DerivationStore::reset`]: forget a derivation, return its original.
//!
//! Image paths are not named consistently, so lookups and resets fall
//! back through a series of name-matching heuristics (see [`path`]).
//! The mappings are checkpointed to a JSON snapshot after every
//! mutation.

pub mod path;
pub mod reset;
pub mod snapshot;
pub mod state;
pub mod store;

pub use reset::{FileProbe, ResetOutcome, ResetTier};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{ChainTier, DerivationState, Recorded, Undo};
pub use store::DerivationStore;

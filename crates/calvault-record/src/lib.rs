//! Versioned records for calvault.
//!
//! Every persisted entity is a small JSON *front file* holding its basic
//! (unhashed) fields plus an ordered history of `(timestamp, hash)` pairs,
//! newest first. The hashed fields live in the object store; the head of the
//! history names the current version.
//!
//! # Modules
//!
//! - [`handle`]: [`StoreHandle`], the filesystem, object store, ID
//!   allocator and read-only state every operation runs against
//! - [`history`]: [`HistoryEntry`] and its tuple encoding
//! - [`schema`]: the [`Schema`] trait describing one entity class
//! - [`record`]: [`Record`] with load, save (with dedup), revisions, delete
//! - [`ids`]: [`IdAllocator`], crash-recoverable per-class counters
//! - [`holder`]: [`Holder`], an ordered, enable-aware index of one class

pub mod error;
pub mod handle;
pub mod history;
pub mod holder;
pub mod ids;
pub mod record;
pub mod schema;

pub use error::{RecordError, RecordResult};
pub use handle::{ExclusiveGuard, HandleOptions, StoreHandle};
pub use history::HistoryEntry;
pub use holder::{Holder, Slot};
pub use ids::{IdAllocator, LAST_IDS_FILE};
pub use record::{read_front_history, Record, SaveMode};
pub use schema::Schema;

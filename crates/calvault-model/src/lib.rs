//! Entity schemas for calvault.
//!
//! Each entity class is a [`Schema`](calvault_record::Schema) marker type
//! plus a pair of serde structs: the basic fields that live in the front
//! file and the hashed content that lives in the object store. The
//! `Event`, `EventGroup`, `Account` and `Trash` aliases are the
//! [`Record`](calvault_record::Record)s callers actually handle.
//!
//! Recurrence rules, notifiers and account payloads are opaque JSON here;
//! interpreting them is the job of the calendar engine, not of storage.

pub mod account;
pub mod error;
pub mod event;
pub mod group;
pub mod id_list;
pub mod trash;

pub use account::{Account, AccountBasic, AccountContent, AccountSchema};
pub use error::{ModelError, ModelResult};
pub use event::{recognize_event, Event, EventBasic, EventContent, EventRule, EventSchema, EventType};
pub use group::{EventGroup, GroupBasic, GroupContent, GroupSchema, GroupType};
pub use id_list::IdList;
pub use trash::{Trash, TrashBasic, TrashContent, TrashSchema, TRASH_FILE};

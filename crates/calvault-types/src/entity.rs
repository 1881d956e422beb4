use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// The persisted entity classes.
///
/// This is a closed set: every front file on disk belongs to exactly one of
/// these classes, and the class decides the directory it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A calendar event.
    Event,
    /// An ordered container of events.
    Group,
    /// A remote-sync account (opaque payload).
    Account,
    /// The singleton trash container.
    Trash,
}

impl EntityKind {
    /// Classes whose ids come from the ID allocator.
    pub const ALLOCATED: [EntityKind; 3] = [Self::Event, Self::Group, Self::Account];

    /// Every class, in the order the garbage collector walks them.
    pub const ALL: [EntityKind; 4] = [Self::Event, Self::Group, Self::Account, Self::Trash];

    /// Stable lowercase name, used as the directory name and the
    /// `last_ids.json` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Group => "group",
            Self::Account => "account",
            Self::Trash => "trash",
        }
    }

    /// Returns `true` if ids for this class are allocated by the counter.
    pub fn is_allocated(&self) -> bool {
        !matches!(self, Self::Trash)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "group" => Ok(Self::Group),
            "account" => Ok(Self::Account),
            "trash" => Ok(Self::Trash),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// Integer id of an entity, unique within its [`EntityKind`].
///
/// Allocated ids are strictly positive. `-1` is reserved for the trash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// The id of the singleton trash.
    pub const TRASH: EntityId = EntityId(-1);

    /// Wrap a raw id.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Returns `true` for the reserved trash id.
    pub fn is_trash(&self) -> bool {
        *self == Self::TRASH
    }

    /// Returns `true` if this id could have come from the allocator.
    pub fn is_allocated(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidEntityId(s.to_string()))
    }
}

impl From<i64> for EntityId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Stable identifier of an entity.
///
/// Assigned once at first save and never changed afterwards, even if the
/// integer id is reassigned (import, orphan adoption). Used to correlate
/// entities across export/import and remote sync.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUuid(Uuid);

impl EntityUuid {
    /// Generate a fresh uuid.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing uuid.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The wrapped uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityUuid({})", self.0)
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

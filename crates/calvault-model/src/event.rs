use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use calvault_record::{Record, Schema};
use calvault_types::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

/// The kind of an event. Stored as the `type` field of its content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    #[default]
    Custom,
    Task,
    AllDayTask,
    DailyNote,
    Yearly,
    Monthly,
    Weekly,
    LargeScale,
    Lifetime,
    UniversityClass,
    UniversityExam,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        Self::Custom,
        Self::Task,
        Self::AllDayTask,
        Self::DailyNote,
        Self::Yearly,
        Self::Monthly,
        Self::Weekly,
        Self::LargeScale,
        Self::Lifetime,
        Self::UniversityClass,
        Self::UniversityExam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Task => "task",
            Self::AllDayTask => "allDayTask",
            Self::DailyNote => "dailyNote",
            Self::Yearly => "yearly",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::LargeScale => "largeScale",
            Self::Lifetime => "lifetime",
            Self::UniversityClass => "universityClass",
            Self::UniversityExam => "universityExam",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::UnknownEventType(s.to_string()))
    }
}

/// One opaque recurrence or timing rule, e.g. `{"type": "start", "value": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: Value,
}

/// Unhashed event fields, kept in `event/<id>.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBasic {
    /// Remote ids per sync account.
    #[serde(default)]
    pub remote_ids: BTreeMap<String, Value>,
    #[serde(default)]
    pub notify_on: bool,
}

/// Hashed event fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_cal_type")]
    pub cal_type: String,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub time_zone_enable: bool,
    #[serde(default)]
    pub rules: Vec<EventRule>,
    #[serde(default)]
    pub notifiers: Vec<Value>,
    /// Seconds before the event to notify.
    #[serde(default)]
    pub notify_before: i64,
}

fn default_cal_type() -> String {
    "gregorian".to_string()
}

impl EventContent {
    pub fn new(event_type: EventType, summary: impl Into<String>) -> Self {
        Self {
            event_type,
            summary: summary.into(),
            description: String::new(),
            icon: String::new(),
            cal_type: default_cal_type(),
            time_zone: None,
            time_zone_enable: false,
            rules: Vec::new(),
            notifiers: Vec::new(),
            notify_before: 0,
        }
    }

    /// Hashed fields as a JSON map, for field-level comparison.
    pub fn to_fields(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Marker type for the event class.
pub struct EventSchema;

impl Schema for EventSchema {
    const KIND: EntityKind = EntityKind::Event;
    type Basic = EventBasic;
    type Content = EventContent;
}

pub type Event = Record<EventSchema>;

/// Decode a content blob as an event, if it carries a known event type tag.
///
/// Used to recognise event versions among unreferenced blobs. Anything that
/// is not a JSON object, has no `type`, has a type that is not an event type,
/// or does not decode as event content yields `None`.
pub fn recognize_event(value: &Value) -> Option<EventContent> {
    let tag = value.as_object()?.get("type")?.as_str()?;
    tag.parse::<EventType>().ok()?;
    serde_json::from_value(value.clone()).ok()
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use calvault_record::{Record, Schema};
use calvault_types::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::event::EventType;
use crate::id_list::IdList;

/// The kind of an event group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupType {
    #[default]
    Group,
    TaskList,
    NoteBook,
    UniversityTerm,
    LifetimeGroup,
}

impl GroupType {
    pub const ALL: [GroupType; 5] = [
        Self::Group,
        Self::TaskList,
        Self::NoteBook,
        Self::UniversityTerm,
        Self::LifetimeGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::TaskList => "taskList",
            Self::NoteBook => "noteBook",
            Self::UniversityTerm => "universityTerm",
            Self::LifetimeGroup => "lifetimeGroup",
        }
    }

    /// The event type new events in a group of this kind get by default.
    pub fn default_event_type(&self) -> EventType {
        match self {
            Self::TaskList => EventType::Task,
            Self::NoteBook => EventType::DailyNote,
            Self::UniversityTerm => EventType::UniversityClass,
            Self::LifetimeGroup => EventType::Lifetime,
            Self::Group => EventType::Custom,
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::UnknownGroupType(s.to_string()))
    }
}

/// Unhashed group fields, kept in `group/<id>.json`.
///
/// Membership lives here, so adding or removing an event never creates a
/// new group version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBasic {
    #[serde(default)]
    pub id_list: IdList,
    #[serde(default)]
    pub remote_ids: BTreeMap<String, Value>,
    #[serde(default)]
    pub remote_sync_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub deleted_remote_events: Vec<Value>,
}

/// Hashed group fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupContent {
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub title: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "yes")]
    pub show_in_cal: bool,
    #[serde(default = "yes")]
    pub show_in_time_line: bool,
    #[serde(default)]
    pub default_event_type: EventType,
    #[serde(default)]
    pub add_events_to_beginning: bool,
    #[serde(default)]
    pub remote_sync_enabled: bool,
}

fn yes() -> bool {
    true
}

impl GroupContent {
    pub fn new(group_type: GroupType, title: impl Into<String>) -> Self {
        Self {
            group_type,
            title: title.into(),
            color: String::new(),
            icon: String::new(),
            show_in_cal: true,
            show_in_time_line: true,
            default_event_type: group_type.default_event_type(),
            add_events_to_beginning: matches!(group_type, GroupType::TaskList),
            remote_sync_enabled: false,
        }
    }
}

/// Marker type for the event group class.
pub struct GroupSchema;

impl Schema for GroupSchema {
    const KIND: EntityKind = EntityKind::Group;
    type Basic = GroupBasic;
    type Content = GroupContent;
}

pub type EventGroup = Record<GroupSchema>;

#[cfg(test)]
mod tests {
    use super::*;
    use calvault_types::EntityId;
    use serde_json::json;

    #[test]
    fn group_types_round_trip() {
        for t in GroupType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
            assert_eq!(t.as_str().parse::<GroupType>().unwrap(), t);
        }
        assert!("task".parse::<GroupType>().is_err());
    }

    #[test]
    fn task_lists_default_to_tasks_at_the_top() {
        let content = GroupContent::new(GroupType::TaskList, "chores");
        assert_eq!(content.default_event_type, EventType::Task);
        assert!(content.add_events_to_beginning);
        assert!(!GroupContent::new(GroupType::Group, "work").add_events_to_beginning);
    }

    #[test]
    fn membership_is_a_basic_field() {
        let mut basic = GroupBasic::default();
        basic.id_list.add(EntityId::new(7), false);
        let json = serde_json::to_value(&basic).unwrap();
        assert_eq!(json["idList"], json!([7]));

        let content = serde_json::to_value(GroupContent::new(GroupType::Group, "x")).unwrap();
        assert!(content.get("idList").is_none());
        assert_eq!(content["showInTimeLine"], json!(true));
    }
}

use calvault_record::{Record, Schema};
use calvault_types::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unhashed account fields, kept in `account/<id>.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBasic {
    #[serde(default)]
    pub remote_groups: Vec<Value>,
}

/// Hashed account fields. `data` is owned by the sync plugin and never
/// interpreted here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountContent {
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub data: Value,
}

impl AccountContent {
    pub fn new(account_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            account_type: account_type.into(),
            title: title.into(),
            enable: true,
            data: Value::Null,
        }
    }
}

pub struct AccountSchema;

impl Schema for AccountSchema {
    const KIND: EntityKind = EntityKind::Account;
    type Basic = AccountBasic;
    type Content = AccountContent;
}

pub type Account = Record<AccountSchema>;

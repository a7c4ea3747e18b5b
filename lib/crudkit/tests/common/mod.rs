#![allow(dead_code)]

use chrono::NaiveDateTime;
use crudkit::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "samples")]
pub struct Sample {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub score: Option<f64>,
    pub active: Option<bool>,
}

/// Soft-deletable and update-tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "documents")]
pub struct Document {
    pub id: i64,
    pub title: String,
    #[column(default_now)]
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

/// Natural string key and a renamed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "accounts")]
pub struct Account {
    #[key]
    pub handle: String,
    #[column(name = "display_name")]
    pub display: String,
    pub note: std::option::Option<String>,
    #[column(skip)]
    #[serde(default)]
    pub cached: Option<String>,
}

pub fn named(name: &str) -> crudkit::FieldMap {
    crudkit::FieldMap::new().with("name", name)
}

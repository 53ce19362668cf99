use crate::db::storage::Row;
use crate::error::PortalError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Client {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    /// Nullable column, defaults to `''` when omitted on insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// `status` is free text; the admin screens use values like "active".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub client_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub assigned_staff_user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Stored credential. The password is only ever held encrypted; `encryption_iv`
/// is the initialisation vector that goes with `password_enc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Credential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub project_id: Option<u64>,
    pub label: String,
    pub username: String,
    pub password_enc: Option<String>,
    pub encryption_iv: String,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub project_id: Option<u64>,
    pub user_id: Option<u64>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// Convert a model into a storage row keyed by column name.
pub fn to_row<T: Serialize>(model: &T) -> Result<Row, PortalError> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(PortalError::Json(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        )))),
    }
}

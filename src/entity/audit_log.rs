use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, now};
use crate::{
    builder::Create,
    driver::Row,
    errors::EntError,
    schema::{EntitySchema, FieldKind, FieldSchema, non_negative, not_empty},
    sql::{Order, Predicate},
    value::Value,
};

pub const TABLE: &str = "audit_logs";
pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_ACTING_USER_ID: &str = "acting_user_id";
pub const FIELD_ORGANIZATION: &str = "organization";
pub const FIELD_MUTATION_TYPE: &str = "mutation_type";
pub const FIELD_OBJECT_ID: &str = "object_id";
pub const FIELD_OBJECT_TYPE: &str = "object_type";
pub const FIELD_OBJECT_DISPLAY_NAME: &str = "object_display_name";
pub const FIELD_MUTATION_DATA: &str = "mutation_data";
pub const FIELD_URL: &str = "url";
pub const FIELD_IP_ADDRESS: &str = "ip_address";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_STATUS_CODE: &str = "status_code";

fn succeeded() -> Value {
    Value::Bool(true)
}

fn ok_status() -> Value {
    Value::Int(200)
}

pub static SCHEMA: EntitySchema = EntitySchema {
    name: "AuditLog",
    table: TABLE,
    id_column: FIELD_ID,
    fields: &[
        FieldSchema::new(FIELD_CREATED_AT, FieldKind::Time)
            .immutable()
            .default(now),
        FieldSchema::new(FIELD_ACTING_USER_ID, FieldKind::Int).immutable(),
        FieldSchema::new(FIELD_ORGANIZATION, FieldKind::String).immutable(),
        FieldSchema::new(FIELD_MUTATION_TYPE, FieldKind::String)
            .immutable()
            .validate(&[not_empty]),
        FieldSchema::new(FIELD_OBJECT_ID, FieldKind::String).immutable(),
        FieldSchema::new(FIELD_OBJECT_TYPE, FieldKind::String)
            .immutable()
            .validate(&[not_empty]),
        FieldSchema::new(FIELD_OBJECT_DISPLAY_NAME, FieldKind::String).immutable(),
        FieldSchema::new(FIELD_MUTATION_DATA, FieldKind::Json)
            .optional()
            .immutable(),
        FieldSchema::new(FIELD_URL, FieldKind::String).immutable(),
        FieldSchema::new(FIELD_IP_ADDRESS, FieldKind::String).immutable(),
        FieldSchema::new(FIELD_STATUS, FieldKind::Bool)
            .immutable()
            .default(succeeded),
        FieldSchema::new(FIELD_STATUS_CODE, FieldKind::Int)
            .immutable()
            .default(ok_status)
            .validate(&[non_negative]),
    ],
    foreign_keys: &[],
    edges: &[],
};

/// One recorded mutation. Audit entries are written once and never updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub acting_user_id: i64,
    pub organization: String,
    pub mutation_type: String,
    pub object_id: String,
    pub object_type: String,
    pub object_display_name: String,
    pub mutation_data: Option<serde_json::Value>,
    pub url: String,
    pub ip_address: String,
    pub status: bool,
    pub status_code: i64,
}

impl Entity for AuditLog {
    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(AuditLog {
            id: row.int(FIELD_ID)?,
            created_at: row.time(FIELD_CREATED_AT)?,
            acting_user_id: row.int(FIELD_ACTING_USER_ID)?,
            organization: row.string(FIELD_ORGANIZATION)?,
            mutation_type: row.string(FIELD_MUTATION_TYPE)?,
            object_id: row.string(FIELD_OBJECT_ID)?,
            object_type: row.string(FIELD_OBJECT_TYPE)?,
            object_display_name: row.string(FIELD_OBJECT_DISPLAY_NAME)?,
            mutation_data: row.json(FIELD_MUTATION_DATA)?,
            url: row.string(FIELD_URL)?,
            ip_address: row.string(FIELD_IP_ADDRESS)?,
            status: row.bool(FIELD_STATUS)?,
            status_code: row.int(FIELD_STATUS_CODE)?,
        })
    }
}

impl Create<AuditLog> {
    pub fn set_acting_user_id(self, id: i64) -> Self {
        self.set(FIELD_ACTING_USER_ID, id)
    }

    pub fn set_organization<S: Into<String>>(self, organization: S) -> Self {
        self.set(FIELD_ORGANIZATION, organization.into())
    }

    pub fn set_mutation_type<S: Into<String>>(self, mutation_type: S) -> Self {
        self.set(FIELD_MUTATION_TYPE, mutation_type.into())
    }

    pub fn set_object<I: Into<String>, T: Into<String>, N: Into<String>>(
        self,
        id: I,
        object_type: T,
        display_name: N,
    ) -> Self {
        self.set(FIELD_OBJECT_ID, id.into())
            .set(FIELD_OBJECT_TYPE, object_type.into())
            .set(FIELD_OBJECT_DISPLAY_NAME, display_name.into())
    }

    pub fn set_mutation_data(self, data: serde_json::Value) -> Self {
        self.set(FIELD_MUTATION_DATA, data)
    }

    pub fn set_request<U: Into<String>, A: Into<String>>(self, url: U, ip_address: A) -> Self {
        self.set(FIELD_URL, url.into())
            .set(FIELD_IP_ADDRESS, ip_address.into())
    }

    pub fn set_status(self, status: bool, status_code: i64) -> Self {
        self.set(FIELD_STATUS, status)
            .set(FIELD_STATUS_CODE, status_code)
    }
}

pub fn acting_user_id_eq(id: i64) -> Predicate {
    Predicate::eq(FIELD_ACTING_USER_ID, id)
}

pub fn organization_eq(organization: &str) -> Predicate {
    Predicate::eq(FIELD_ORGANIZATION, organization)
}

pub fn object_type_eq(object_type: &str) -> Predicate {
    Predicate::eq(FIELD_OBJECT_TYPE, object_type)
}

pub fn failed() -> Predicate {
    Predicate::eq(FIELD_STATUS, false)
}

pub fn newest_first() -> Order {
    Order::desc(FIELD_CREATED_AT)
}

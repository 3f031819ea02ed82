//! Tenants and the domains and networks registered to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, empty_list, now};
use crate::{
    builder::{Create, UpdateOne},
    driver::Row,
    errors::EntError,
    schema::{EntitySchema, FieldKind, FieldSchema, not_empty},
    sql::Predicate,
    value::Value,
};

pub const TABLE: &str = "tenants";
pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_NAME: &str = "name";
pub const FIELD_DOMAINS: &str = "domains";
pub const FIELD_NETWORKS: &str = "networks";

pub static SCHEMA: EntitySchema = EntitySchema {
    name: "Tenant",
    table: TABLE,
    id_column: FIELD_ID,
    fields: &[
        FieldSchema::new(FIELD_CREATED_AT, FieldKind::Time)
            .immutable()
            .default(now),
        FieldSchema::new(FIELD_UPDATED_AT, FieldKind::Time)
            .default(now)
            .update_default(now),
        FieldSchema::new(FIELD_NAME, FieldKind::String)
            .unique()
            .validate(&[not_empty]),
        FieldSchema::new(FIELD_DOMAINS, FieldKind::Json).default(empty_list),
        FieldSchema::new(FIELD_NETWORKS, FieldKind::Json).default(empty_list),
    ],
    foreign_keys: &[],
    edges: &[],
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub domains: Vec<String>,
    pub networks: Vec<String>,
}

impl Entity for Tenant {
    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(Tenant {
            id: row.int(FIELD_ID)?,
            created_at: row.time(FIELD_CREATED_AT)?,
            updated_at: row.time(FIELD_UPDATED_AT)?,
            name: row.string(FIELD_NAME)?,
            domains: row.json(FIELD_DOMAINS)?,
            networks: row.json(FIELD_NETWORKS)?,
        })
    }
}

fn list(values: Vec<String>) -> Value {
    Value::Json(serde_json::Value::from(values))
}

impl Create<Tenant> {
    pub fn set_name<S: Into<String>>(self, name: S) -> Self {
        self.set(FIELD_NAME, name.into())
    }

    pub fn set_domains(self, domains: Vec<String>) -> Self {
        self.set(FIELD_DOMAINS, list(domains))
    }

    pub fn set_networks(self, networks: Vec<String>) -> Self {
        self.set(FIELD_NETWORKS, list(networks))
    }
}

impl UpdateOne<Tenant> {
    pub fn set_name<S: Into<String>>(self, name: S) -> Self {
        self.set(FIELD_NAME, name.into())
    }

    pub fn set_domains(self, domains: Vec<String>) -> Self {
        self.set(FIELD_DOMAINS, list(domains))
    }

    pub fn set_networks(self, networks: Vec<String>) -> Self {
        self.set(FIELD_NETWORKS, list(networks))
    }
}

pub fn name_eq(name: &str) -> Predicate {
    Predicate::eq(FIELD_NAME, name)
}

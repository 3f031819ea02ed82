//! The [`Entity`] trait and the entity types shipped with the crate.

pub mod audit_log;
pub mod tenant;
pub mod token;
pub mod user;

pub use audit_log::AuditLog;
pub use tenant::Tenant;
pub use token::Token;
pub use user::{Role, User};

use std::fmt;

use chrono::Utc;

use crate::{
    driver::Row,
    errors::EntError,
    schema::{EdgeRegistry, EntitySchema},
    value::Value,
};

/// A typed record backed by one table.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema;

    fn id(&self) -> i64;

    /// Decodes a row holding every column of [`EntitySchema::columns`].
    fn from_row(row: &Row) -> Result<Self, EntError>;

    /// Value of a foreign-key column stored on this record.
    fn foreign_key(&self, _column: &str) -> Option<i64> {
        None
    }
}

/// Schemas of the shipped entities.
pub fn schemas() -> [&'static EntitySchema; 4] {
    [
        &audit_log::SCHEMA,
        &tenant::SCHEMA,
        &token::SCHEMA,
        &user::SCHEMA,
    ]
}

/// Registry over [`schemas`].
pub fn registry() -> Result<EdgeRegistry, EntError> {
    EdgeRegistry::new(&schemas())
}

pub(crate) fn now() -> Value {
    Value::Time(Utc::now())
}

pub(crate) fn empty_list() -> Value {
    Value::Json(serde_json::Value::Array(Vec::new()))
}

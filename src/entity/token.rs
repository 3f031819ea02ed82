//! API tokens. Every token belongs to exactly one user through the required
//! `user` edge.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, User, now, user};
use crate::{
    builder::{Create, Query, UpdateOne},
    client::EntityClient,
    driver::Row,
    errors::EntError,
    schema::{EdgeDescriptor, EntitySchema, FieldKind, FieldSchema, Rel, not_empty},
    sql::Predicate,
    value::Value,
};

pub const TABLE: &str = "tokens";
pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_VALUE: &str = "value";

pub const EDGE_USER: &str = "user";
/// Foreign key to the owning user.
pub const USER_COLUMN: &str = user::TOKENS_COLUMN;

pub static SCHEMA: EntitySchema = EntitySchema {
    name: "Token",
    table: TABLE,
    id_column: FIELD_ID,
    fields: &[
        FieldSchema::new(FIELD_CREATED_AT, FieldKind::Time)
            .immutable()
            .default(now),
        FieldSchema::new(FIELD_UPDATED_AT, FieldKind::Time)
            .default(now)
            .update_default(now),
        FieldSchema::new(FIELD_VALUE, FieldKind::String)
            .unique()
            .sensitive()
            .validate(&[not_empty]),
    ],
    foreign_keys: &[USER_COLUMN],
    edges: &[EdgeDescriptor {
        name: EDGE_USER,
        source: "Token",
        target: "User",
        rel: Rel::ManyToOne,
        inverse: user::EDGE_TOKENS,
        table: TABLE,
        columns: &[USER_COLUMN],
        required: true,
    }],
};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub value: String,
    /// Owning user; `None` only once the user row has been deleted.
    pub user_id: Option<i64>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("value", &"<sensitive>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Entity for Token {
    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(Token {
            id: row.int(FIELD_ID)?,
            created_at: row.time(FIELD_CREATED_AT)?,
            updated_at: row.time(FIELD_UPDATED_AT)?,
            value: row.string(FIELD_VALUE)?,
            user_id: row.opt_int(USER_COLUMN)?,
        })
    }

    fn foreign_key(&self, column: &str) -> Option<i64> {
        match column {
            USER_COLUMN => self.user_id,
            _ => None,
        }
    }
}

impl Create<Token> {
    pub fn set_value<S: Into<String>>(self, value: S) -> Self {
        self.set(FIELD_VALUE, value.into())
    }

    pub fn set_user_id(self, id: i64) -> Self {
        self.set_edge_id(EDGE_USER, id)
    }

    pub fn set_user(self, user: &User) -> Self {
        self.set_user_id(user.id)
    }
}

impl UpdateOne<Token> {
    pub fn set_value<S: Into<String>>(self, value: S) -> Self {
        self.set(FIELD_VALUE, value.into())
    }

    pub fn set_user_id(self, id: i64) -> Self {
        self.set_edge_id(EDGE_USER, id)
    }
}

impl EntityClient<Token> {
    /// The user owning `token`.
    pub fn query_user(&self, token: &Token) -> Result<Query<User>, EntError> {
        self.query_edge(token, EDGE_USER)
    }
}

pub fn id_eq(id: i64) -> Predicate {
    Predicate::eq(FIELD_ID, id)
}

pub fn value_eq(value: &str) -> Predicate {
    Predicate::eq(FIELD_VALUE, value)
}

pub fn user_id_eq(id: i64) -> Predicate {
    Predicate::eq(USER_COLUMN, Value::Int(id))
}

pub fn has_user() -> Predicate {
    Predicate::has_edge(EDGE_USER)
}

pub fn has_user_with(predicates: Vec<Predicate>) -> Predicate {
    Predicate::has_edge_with(EDGE_USER, predicates)
}

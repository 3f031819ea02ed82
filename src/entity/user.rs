//! User accounts. A user owns any number of API tokens through the
//! `tokens` edge, stored as the `user_tokens` column on the tokens table.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Token, empty_list, now, token};
use crate::{
    builder::{Create, Query, Update, UpdateOne},
    client::EntityClient,
    driver::Row,
    errors::EntError,
    schema::{EdgeDescriptor, EntitySchema, FieldKind, FieldSchema, Rel, not_empty},
    sql::{Order, Predicate},
    value::Value,
};

pub const TABLE: &str = "users";
pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_TENANT: &str = "tenant";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_ROLE: &str = "role";
pub const FIELD_NETWORKS: &str = "networks";

pub const EDGE_TOKENS: &str = "tokens";
/// Column on the tokens table referencing the owning user.
pub const TOKENS_COLUMN: &str = "user_tokens";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    Readonly,
}

impl Role {
    pub const VALUES: &'static [&'static str] = &["user", "admin", "readonly"];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Readonly => "readonly",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "readonly" => Ok(Role::Readonly),
            other => Err(EntError::decode(format!("unknown role {other:?}"))),
        }
    }
}

impl From<Role> for Value {
    fn from(role: Role) -> Self {
        Value::from(role.as_str())
    }
}

fn default_role() -> Value {
    Value::from(Role::User)
}

pub static SCHEMA: EntitySchema = EntitySchema {
    name: "User",
    table: TABLE,
    id_column: FIELD_ID,
    fields: &[
        FieldSchema::new(FIELD_CREATED_AT, FieldKind::Time)
            .immutable()
            .default(now),
        FieldSchema::new(FIELD_UPDATED_AT, FieldKind::Time)
            .default(now)
            .update_default(now),
        FieldSchema::new(FIELD_TENANT, FieldKind::String).validate(&[not_empty]),
        FieldSchema::new(FIELD_EMAIL, FieldKind::String)
            .unique()
            .validate(&[not_empty]),
        FieldSchema::new(FIELD_ROLE, FieldKind::Enum(Role::VALUES)).default(default_role),
        FieldSchema::new(FIELD_NETWORKS, FieldKind::Json).default(empty_list),
    ],
    foreign_keys: &[],
    edges: &[EdgeDescriptor {
        name: EDGE_TOKENS,
        source: "User",
        target: "Token",
        rel: Rel::OneToMany,
        inverse: token::EDGE_USER,
        table: token::TABLE,
        columns: &[TOKENS_COLUMN],
        required: false,
    }],
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tenant: String,
    pub email: String,
    pub role: Role,
    pub networks: Vec<String>,
}

impl Entity for User {
    fn schema() -> &'static EntitySchema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self, EntError> {
        Ok(User {
            id: row.int(FIELD_ID)?,
            created_at: row.time(FIELD_CREATED_AT)?,
            updated_at: row.time(FIELD_UPDATED_AT)?,
            tenant: row.string(FIELD_TENANT)?,
            email: row.string(FIELD_EMAIL)?,
            role: row.string(FIELD_ROLE)?.parse()?,
            networks: row.json(FIELD_NETWORKS)?,
        })
    }
}

fn networks_value(networks: Vec<String>) -> Value {
    Value::Json(serde_json::Value::from(networks))
}

impl Create<User> {
    pub fn set_tenant<S: Into<String>>(self, tenant: S) -> Self {
        self.set(FIELD_TENANT, tenant.into())
    }

    pub fn set_email<S: Into<String>>(self, email: S) -> Self {
        self.set(FIELD_EMAIL, email.into())
    }

    pub fn set_role(self, role: Role) -> Self {
        self.set(FIELD_ROLE, role)
    }

    pub fn set_networks(self, networks: Vec<String>) -> Self {
        self.set(FIELD_NETWORKS, networks_value(networks))
    }

    pub fn add_token_ids<I: IntoIterator<Item = i64>>(self, ids: I) -> Self {
        self.add_edge_ids(EDGE_TOKENS, ids)
    }
}

impl Update<User> {
    pub fn set_tenant<S: Into<String>>(self, tenant: S) -> Self {
        self.set(FIELD_TENANT, tenant.into())
    }

    pub fn set_role(self, role: Role) -> Self {
        self.set(FIELD_ROLE, role)
    }
}

impl UpdateOne<User> {
    pub fn set_tenant<S: Into<String>>(self, tenant: S) -> Self {
        self.set(FIELD_TENANT, tenant.into())
    }

    pub fn set_email<S: Into<String>>(self, email: S) -> Self {
        self.set(FIELD_EMAIL, email.into())
    }

    pub fn set_role(self, role: Role) -> Self {
        self.set(FIELD_ROLE, role)
    }

    pub fn set_networks(self, networks: Vec<String>) -> Self {
        self.set(FIELD_NETWORKS, networks_value(networks))
    }

    pub fn add_token_ids<I: IntoIterator<Item = i64>>(self, ids: I) -> Self {
        self.add_edge_ids(EDGE_TOKENS, ids)
    }

    pub fn remove_token_ids<I: IntoIterator<Item = i64>>(self, ids: I) -> Self {
        self.remove_edge_ids(EDGE_TOKENS, ids)
    }

    pub fn clear_tokens(self) -> Self {
        self.clear_edge(EDGE_TOKENS)
    }
}

impl EntityClient<User> {
    /// Tokens owned by `user`.
    pub fn query_tokens(&self, user: &User) -> Result<Query<Token>, EntError> {
        self.query_edge(user, EDGE_TOKENS)
    }
}

pub fn id_eq(id: i64) -> Predicate {
    Predicate::eq(FIELD_ID, id)
}

pub fn email_eq(email: &str) -> Predicate {
    Predicate::eq(FIELD_EMAIL, email)
}

pub fn email_contains(needle: &str) -> Predicate {
    Predicate::contains(FIELD_EMAIL, needle)
}

pub fn tenant_eq(tenant: &str) -> Predicate {
    Predicate::eq(FIELD_TENANT, tenant)
}

pub fn role_eq(role: Role) -> Predicate {
    Predicate::eq(FIELD_ROLE, role)
}

pub fn created_at_lt(time: DateTime<Utc>) -> Predicate {
    Predicate::lt(FIELD_CREATED_AT, time)
}

pub fn has_tokens() -> Predicate {
    Predicate::has_edge(EDGE_TOKENS)
}

pub fn has_tokens_with(predicates: Vec<Predicate>) -> Predicate {
    Predicate::has_edge_with(EDGE_TOKENS, predicates)
}

pub fn by_email() -> Order {
    Order::asc(FIELD_EMAIL)
}

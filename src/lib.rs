//! Typed data access over a relational store.
//!
//! Entities describe themselves with static metadata; generic builders
//! create, update, delete and query them, and declared edges between entity
//! types resolve into neighbor queries through [`neighbors`].
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod builder;
pub mod client;
pub mod context;
pub mod dialect;
pub mod driver;
pub mod entity;
pub mod errors;
pub mod migrate;
#[cfg(feature = "must")]
pub mod must;
pub mod neighbors;
pub mod schema;
pub mod sql;
pub mod value;

pub use crate::builder::{Create, CreateBulk, Delete, DeleteOne, Query, Update, UpdateOne};
pub use crate::client::{Client, ClientOption, Config, EntityClient, Tx, open};
pub use crate::context::{CancelHandle, Context};
pub use crate::dialect::{Dialect, MYSQL, POSTGRES, SQLITE};
pub use crate::driver::{
    DebugDriver, Driver, ExecResult, Logger, Row, Rows, SqliteConfig, SqliteDriver, Transaction,
    TxDriver, TxState, default_logger,
};
pub use crate::entity::{AuditLog, Entity, Role, Tenant, Token, User};
pub use crate::errors::EntError;
pub use crate::migrate::{MigrationReport, Schema, TableStatus};
pub use crate::neighbors::{Selector, Step, neighbors};
pub use crate::schema::{EdgeDescriptor, EdgeRegistry, EntitySchema, FieldKind, FieldSchema, Rel};
pub use crate::sql::{Column, Order, Predicate, Statement};
pub use crate::value::Value;

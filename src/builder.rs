//! Create, update, delete and query builders over any [`Entity`].
//!
//! Builders accumulate state by value and only touch the driver when an
//! execution method (`save`, `exec`, `all`, ...) is called. Invalid input
//! recorded while building (an unknown field name, an edge misuse) is kept
//! on the builder and reported by the execution method, before any
//! statement is issued.

mod create;
mod delete;
mod query;
mod update;

pub use create::{Create, CreateBulk};
pub use delete::{Delete, DeleteOne};
pub use query::Query;
pub use update::{Update, UpdateOne};

use std::sync::Arc;

use crate::{
    client::Config,
    context::Context,
    driver::{Driver, TxDriver},
    entity::Entity,
    errors::EntError,
    schema::{EdgeDescriptor, EdgeRegistry, EntitySchema, FieldSchema, Rel},
    sql::{SqlBuilder, Statement},
    value::Value,
};

/// Runs `op` inside a transaction unless `config` already is one.
pub(crate) fn with_tx<T>(
    config: &Config,
    ctx: &Context,
    op: impl FnOnce(&Config) -> Result<T, EntError>,
) -> Result<T, EntError> {
    if config.driver().in_transaction() {
        return op(config);
    }
    let tx = Arc::new(TxDriver::new(
        config.driver().tx(ctx)?,
        config.dialect(),
    ));
    let scoped = config.with_driver(Arc::clone(&tx) as Arc<dyn Driver>);
    match op(&scoped) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback() {
                tracing::warn!(error = %rollback, "rollback after failed write");
            }
            Err(err)
        }
    }
}

pub(crate) fn load<E: Entity>(
    config: &Config,
    ctx: &Context,
    stmt: &Statement,
) -> Result<Vec<E>, EntError> {
    config
        .driver()
        .query(ctx, stmt)?
        .iter()
        .map(E::from_row)
        .collect()
}

#[derive(Clone, Debug)]
enum EdgeChange {
    Set(String, i64),
    Clear(String),
    Add(String, Vec<i64>),
    Remove(String, Vec<i64>),
}

/// Field and edge changes shared by the create and update builders.
#[derive(Clone, Debug, Default)]
pub(crate) struct Mutation {
    fields: Vec<(&'static FieldSchema, Value)>,
    cleared: Vec<&'static FieldSchema>,
    edges: Vec<EdgeChange>,
    invalid: Option<(String, String)>,
}

impl Mutation {
    fn reject(&mut self, field: &str, reason: &str) {
        if self.invalid.is_none() {
            self.invalid = Some((field.to_string(), reason.to_string()));
        }
    }

    pub(crate) fn set(&mut self, schema: &'static EntitySchema, field: &str, value: Value) {
        match schema.field(field) {
            Some(field) => self.put(field, value),
            None => self.reject(field, "unknown field"),
        }
    }

    fn put(&mut self, field: &'static FieldSchema, value: Value) {
        self.cleared.retain(|cleared| cleared.name != field.name);
        match self.fields.iter_mut().find(|(f, _)| f.name == field.name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub(crate) fn clear(&mut self, schema: &'static EntitySchema, field: &str) {
        let Some(field) = schema.field(field) else {
            self.reject(field, "unknown field");
            return;
        };
        self.fields.retain(|(f, _)| f.name != field.name);
        if !self.cleared.iter().any(|cleared| cleared.name == field.name) {
            self.cleared.push(field);
        }
    }

    pub(crate) fn set_edge(&mut self, edge: &str, id: i64) {
        self.edges.push(EdgeChange::Set(edge.to_string(), id));
    }

    pub(crate) fn clear_edge(&mut self, edge: &str) {
        self.edges.push(EdgeChange::Clear(edge.to_string()));
    }

    pub(crate) fn add_edge_ids(&mut self, edge: &str, ids: Vec<i64>) {
        self.edges.push(EdgeChange::Add(edge.to_string(), ids));
    }

    pub(crate) fn remove_edge_ids(&mut self, edge: &str, ids: Vec<i64>) {
        self.edges.push(EdgeChange::Remove(edge.to_string(), ids));
    }

    pub(crate) fn value(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(f, _)| f.name == field)
            .map(|(_, value)| value)
    }

    /// The first problem recorded while building, if any.
    pub(crate) fn recorded_error(&mut self) -> Result<(), EntError> {
        match self.invalid.take() {
            Some((field, reason)) => Err(EntError::validation(field, reason)),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_defaults(&mut self, schema: &'static EntitySchema) {
        for field in schema.fields {
            if let Some(generate) = field.default {
                if self.value(field.name).is_none() {
                    self.put(field, generate());
                }
            }
        }
    }

    pub(crate) fn apply_update_defaults(&mut self, schema: &'static EntitySchema) {
        for field in schema.fields {
            if let Some(generate) = field.update_default {
                let untouched = self.value(field.name).is_none()
                    && !self.cleared.iter().any(|cleared| cleared.name == field.name);
                if untouched {
                    self.put(field, generate());
                }
            }
        }
    }

    /// Create-time validation: every value checked, every non-optional field present.
    pub(crate) fn check_create(&self, schema: &'static EntitySchema) -> Result<(), EntError> {
        for (field, value) in &self.fields {
            field.check(value)?;
        }
        for field in schema.fields {
            if !field.optional && self.value(field.name).is_none() {
                return Err(EntError::validation(field.name, "missing required field"));
            }
        }
        Ok(())
    }

    pub(crate) fn check_update(&self) -> Result<(), EntError> {
        for (field, value) in &self.fields {
            if field.immutable {
                return Err(EntError::validation(field.name, "field is immutable"));
            }
            field.check(value)?;
        }
        for field in &self.cleared {
            if field.immutable {
                return Err(EntError::validation(field.name, "field is immutable"));
            }
            if !field.optional {
                return Err(EntError::validation(field.name, "field is not optional"));
            }
        }
        Ok(())
    }

    /// Column assignments in set order: set fields, cleared fields as NULL, then
    /// foreign keys from the edge plan.
    pub(crate) fn assignments(&self, plan: &EdgePlan) -> Vec<(&'static str, Value)> {
        let mut out: Vec<(&'static str, Value)> = self
            .fields
            .iter()
            .map(|(field, value)| (field.name, value.clone()))
            .collect();
        out.extend(self.cleared.iter().map(|field| (field.name, Value::Null)));
        out.extend(plan.foreign_keys.iter().cloned());
        out
    }

    pub(crate) fn edge_plan(
        &self,
        registry: &EdgeRegistry,
        schema: &'static EntitySchema,
    ) -> Result<EdgePlan, EntError> {
        let mut plan = EdgePlan::default();
        for change in &self.edges {
            match change {
                EdgeChange::Set(name, id) => {
                    let edge = registry.edge(schema.name, name)?;
                    let fk = owned_column(edge)?;
                    plan.put_key(fk, Value::Int(*id));
                }
                EdgeChange::Clear(name) => {
                    let edge = registry.edge(schema.name, name)?;
                    if edge.rel == Rel::ManyToOne {
                        if edge.required {
                            return Err(EntError::validation(
                                edge.name,
                                "required edge cannot be cleared",
                            ));
                        }
                        plan.put_key(owned_column(edge)?, Value::Null);
                    } else {
                        plan.writes.push(EdgeWrite::Clear(edge));
                    }
                }
                EdgeChange::Add(name, ids) => {
                    let edge = registry.edge(schema.name, name)?;
                    many_side(edge)?;
                    plan.writes.push(EdgeWrite::Attach(edge, dedup(ids)));
                }
                EdgeChange::Remove(name, ids) => {
                    let edge = registry.edge(schema.name, name)?;
                    many_side(edge)?;
                    plan.writes.push(EdgeWrite::Detach(edge, dedup(ids)));
                }
            }
        }
        Ok(plan)
    }
}

fn owned_column(edge: &'static EdgeDescriptor) -> Result<&'static str, EntError> {
    if edge.rel != Rel::ManyToOne {
        return Err(EntError::validation(
            edge.name,
            "only many-to-one edges take a single id",
        ));
    }
    edge.fk_column()
        .ok_or_else(|| EntError::schema(format!("edge {} has no column", edge.name)))
}

fn many_side(edge: &'static EdgeDescriptor) -> Result<(), EntError> {
    if edge.rel == Rel::ManyToOne {
        return Err(EntError::validation(
            edge.name,
            "many-to-one edges are set with set_edge_id",
        ));
    }
    Ok(())
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Edge writes that live outside the mutated row.
#[derive(Clone, Debug)]
pub(crate) enum EdgeWrite {
    Attach(&'static EdgeDescriptor, Vec<i64>),
    Detach(&'static EdgeDescriptor, Vec<i64>),
    Clear(&'static EdgeDescriptor),
}

impl EdgeWrite {
    pub(crate) fn edge(&self) -> &'static EdgeDescriptor {
        match self {
            EdgeWrite::Attach(edge, _) | EdgeWrite::Detach(edge, _) | EdgeWrite::Clear(edge) => {
                edge
            }
        }
    }
}

/// Resolved edge changes: foreign keys stored on the row itself, plus writes
/// to other tables that need the row id.
#[derive(Clone, Debug, Default)]
pub(crate) struct EdgePlan {
    pub foreign_keys: Vec<(&'static str, Value)>,
    pub writes: Vec<EdgeWrite>,
}

impl EdgePlan {
    fn put_key(&mut self, column: &'static str, value: Value) {
        match self.foreign_keys.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.foreign_keys.push((column, value)),
        }
    }

    pub(crate) fn key(&self, column: &str) -> Option<&Value> {
        self.foreign_keys
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, value)| value)
    }

    /// Applies the out-of-row writes for the row `id` of `schema`.
    pub(crate) fn apply(
        &self,
        config: &Config,
        ctx: &Context,
        schema: &'static EntitySchema,
        id: i64,
    ) -> Result<(), EntError> {
        for write in &self.writes {
            apply_write(config, ctx, schema, id, write)?;
        }
        Ok(())
    }
}

fn apply_write(
    config: &Config,
    ctx: &Context,
    schema: &'static EntitySchema,
    id: i64,
    write: &EdgeWrite,
) -> Result<(), EntError> {
    let edge = write.edge();
    let target_id = config.registry().entity(edge.target)?.id_column;
    let mut b = SqlBuilder::new(config.dialect());
    match (edge.rel, write) {
        (Rel::ManyToOne, _) => {
            return Err(EntError::invalid_input(format!(
                "edge {} is stored on {}",
                edge.name, schema.table
            )));
        }
        (Rel::OneToMany, EdgeWrite::Attach(_, ids)) => {
            if ids.is_empty() {
                return Ok(());
            }
            let fk = fk_of(edge)?;
            b.push("UPDATE ")
                .ident(edge.table)
                .push(" SET ")
                .ident(fk)
                .push(" = ")
                .arg(Value::Int(id))
                .push(" WHERE ")
                .ident(target_id)
                .push(" IN (");
            push_ids(&mut b, ids);
            b.push(") AND ").ident(fk).push(" IS NULL");
            let affected = config.driver().exec(ctx, &b.finish())?.rows_affected;
            if affected != ids.len() {
                return Err(EntError::invalid_input(format!(
                    "one of {ids:?} is missing or already connected through {}.{}",
                    schema.name, edge.name
                )));
            }
            return Ok(());
        }
        (Rel::OneToMany, EdgeWrite::Detach(_, ids)) => {
            if ids.is_empty() {
                return Ok(());
            }
            let fk = fk_of(edge)?;
            b.push("UPDATE ")
                .ident(edge.table)
                .push(" SET ")
                .ident(fk)
                .push(" = NULL WHERE ")
                .ident(target_id)
                .push(" IN (");
            push_ids(&mut b, ids);
            b.push(") AND ").ident(fk).push(" = ").arg(Value::Int(id));
        }
        (Rel::OneToMany, EdgeWrite::Clear(_)) => {
            let fk = fk_of(edge)?;
            b.push("UPDATE ")
                .ident(edge.table)
                .push(" SET ")
                .ident(fk)
                .push(" = NULL WHERE ")
                .ident(fk)
                .push(" = ")
                .arg(Value::Int(id));
        }
        (Rel::ManyToMany, EdgeWrite::Attach(_, ids)) => {
            if ids.is_empty() {
                return Ok(());
            }
            let (source, target) = join_of(edge)?;
            b.push("INSERT INTO ")
                .ident(edge.table)
                .push(" (")
                .idents(&[source, target])
                .push(") VALUES ");
            for (idx, target_id) in ids.iter().enumerate() {
                if idx > 0 {
                    b.push(", ");
                }
                b.push("(")
                    .arg(Value::Int(id))
                    .push(", ")
                    .arg(Value::Int(*target_id))
                    .push(")");
            }
        }
        (Rel::ManyToMany, EdgeWrite::Detach(_, ids)) => {
            if ids.is_empty() {
                return Ok(());
            }
            let (source, target) = join_of(edge)?;
            b.push("DELETE FROM ")
                .ident(edge.table)
                .push(" WHERE ")
                .ident(source)
                .push(" = ")
                .arg(Value::Int(id))
                .push(" AND ")
                .ident(target)
                .push(" IN (");
            push_ids(&mut b, ids);
            b.push(")");
        }
        (Rel::ManyToMany, EdgeWrite::Clear(_)) => {
            let (source, _) = join_of(edge)?;
            b.push("DELETE FROM ")
                .ident(edge.table)
                .push(" WHERE ")
                .ident(source)
                .push(" = ")
                .arg(Value::Int(id));
        }
    }
    config.driver().exec(ctx, &b.finish())?;
    Ok(())
}

fn fk_of(edge: &EdgeDescriptor) -> Result<&'static str, EntError> {
    edge.fk_column()
        .ok_or_else(|| EntError::schema(format!("edge {} has no column", edge.name)))
}

fn join_of(edge: &EdgeDescriptor) -> Result<(&'static str, &'static str), EntError> {
    edge.join_columns()
        .ok_or_else(|| EntError::schema(format!("edge {} needs two join columns", edge.name)))
}

fn push_ids(b: &mut SqlBuilder, ids: &[i64]) {
    for (idx, id) in ids.iter().enumerate() {
        if idx > 0 {
            b.push(", ");
        }
        b.arg(Value::Int(*id));
    }
}

use std::marker::PhantomData;

use super::{EdgePlan, Mutation, Query, with_tx};
use crate::{
    client::Config,
    context::Context,
    entity::Entity,
    errors::EntError,
    sql::{Predicate, Scope, SqlBuilder, Statement},
    value::Value,
};

/// Bulk update of every `E` matching the filters.
#[derive(Clone, Debug)]
pub struct Update<E: Entity> {
    config: Config,
    predicates: Vec<Predicate>,
    mutation: Mutation,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Update<E> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            predicates: Vec::new(),
            mutation: Mutation::default(),
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn set<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.mutation.set(E::schema(), field, value.into());
        self
    }

    pub fn clear(mut self, field: &str) -> Self {
        self.mutation.clear(E::schema(), field);
        self
    }

    pub fn set_edge_id(mut self, edge: &str, id: i64) -> Self {
        self.mutation.set_edge(edge, id);
        self
    }

    pub fn clear_edge(mut self, edge: &str) -> Self {
        self.mutation.clear_edge(edge);
        self
    }

    /// Applies the changes and returns the number of affected rows.
    ///
    /// Only many-to-one edges can be changed in bulk; their foreign key lives
    /// on the updated rows.
    pub fn save(mut self, ctx: &Context) -> Result<usize, EntError> {
        let plan = prepare::<E>(&self.config, &mut self.mutation)?;
        if let Some(write) = plan.writes.first() {
            return Err(EntError::validation(
                write.edge().name,
                "bulk updates only change many-to-one edges",
            ));
        }
        let assignments = self.mutation.assignments(&plan);
        if assignments.is_empty() {
            let query = self
                .predicates
                .into_iter()
                .fold(Query::<E>::new(self.config), Query::filter);
            return query.count(ctx);
        }
        let stmt = update_statement::<E>(&self.config, &assignments, &self.predicates)?;
        Ok(self.config.driver().exec(ctx, &stmt)?.rows_affected)
    }
}

/// Update of a single `E` by id, returning the re-read entity.
#[derive(Clone, Debug)]
pub struct UpdateOne<E: Entity> {
    config: Config,
    id: i64,
    mutation: Mutation,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> UpdateOne<E> {
    pub(crate) fn new(config: Config, id: i64) -> Self {
        Self {
            config,
            id,
            mutation: Mutation::default(),
            _entity: PhantomData,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn set<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.mutation.set(E::schema(), field, value.into());
        self
    }

    pub fn clear(mut self, field: &str) -> Self {
        self.mutation.clear(E::schema(), field);
        self
    }

    pub fn set_edge_id(mut self, edge: &str, id: i64) -> Self {
        self.mutation.set_edge(edge, id);
        self
    }

    /// Clears an edge of any cardinality.
    pub fn clear_edge(mut self, edge: &str) -> Self {
        self.mutation.clear_edge(edge);
        self
    }

    pub fn add_edge_ids<I: IntoIterator<Item = i64>>(mut self, edge: &str, ids: I) -> Self {
        self.mutation.add_edge_ids(edge, ids.into_iter().collect());
        self
    }

    pub fn remove_edge_ids<I: IntoIterator<Item = i64>>(mut self, edge: &str, ids: I) -> Self {
        self.mutation.remove_edge_ids(edge, ids.into_iter().collect());
        self
    }

    /// Applies the changes and re-reads the entity; `NotFound` if the id does not exist.
    pub fn save(mut self, ctx: &Context) -> Result<E, EntError> {
        let plan = prepare::<E>(&self.config, &mut self.mutation)?;
        let assignments = self.mutation.assignments(&plan);
        let id = self.id;
        let run = |config: &Config| -> Result<E, EntError> {
            let schema = E::schema();
            let by_id = || Query::<E>::new(config.clone()).filter(Predicate::eq(schema.id_column, id));
            if assignments.is_empty() {
                if !by_id().exist(ctx)? {
                    return Err(EntError::not_found(schema.label()));
                }
            } else {
                let predicates = [Predicate::eq(schema.id_column, id)];
                let stmt = update_statement::<E>(config, &assignments, &predicates)?;
                if config.driver().exec(ctx, &stmt)?.rows_affected == 0 {
                    return Err(EntError::not_found(schema.label()));
                }
            }
            plan.apply(config, ctx, schema, id)?;
            by_id().only(ctx)
        };
        if plan.writes.is_empty() {
            run(&self.config)
        } else {
            with_tx(&self.config, ctx, run)
        }
    }
}

fn prepare<E: Entity>(config: &Config, mutation: &mut Mutation) -> Result<EdgePlan, EntError> {
    let schema = E::schema();
    mutation.recorded_error()?;
    mutation.check_update()?;
    let plan = mutation.edge_plan(config.registry(), schema)?;
    mutation.apply_update_defaults(schema);
    Ok(plan)
}

fn update_statement<E: Entity>(
    config: &Config,
    assignments: &[(&'static str, Value)],
    predicates: &[Predicate],
) -> Result<Statement, EntError> {
    let schema = E::schema();
    let scope = Scope::new(schema, config.registry());
    let mut b = SqlBuilder::new(config.dialect());
    b.push("UPDATE ").ident(schema.table).push(" SET ");
    for (idx, (column, value)) in assignments.iter().enumerate() {
        if idx > 0 {
            b.push(", ");
        }
        b.ident(column).push(" = ");
        if value.is_null() {
            b.push("NULL");
        } else {
            b.arg(value.clone());
        }
    }
    if !predicates.is_empty() {
        b.push(" WHERE ");
        scope.conjunction(&mut b, predicates)?;
    }
    Ok(b.finish())
}

use std::marker::PhantomData;

use crate::{
    client::Config,
    context::Context,
    entity::Entity,
    errors::EntError,
    sql::{Predicate, Scope, SqlBuilder},
};

/// Bulk delete of every `E` matching the filters.
#[derive(Clone, Debug)]
pub struct Delete<E: Entity> {
    config: Config,
    predicates: Vec<Predicate>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Delete<E> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            predicates: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Deletes the matching rows and returns how many were removed.
    pub fn exec(self, ctx: &Context) -> Result<usize, EntError> {
        let schema = E::schema();
        let scope = Scope::new(schema, self.config.registry());
        let mut b = SqlBuilder::new(self.config.dialect());
        b.push("DELETE FROM ").ident(schema.table);
        if !self.predicates.is_empty() {
            b.push(" WHERE ");
            scope.conjunction(&mut b, &self.predicates)?;
        }
        Ok(self.config.driver().exec(ctx, &b.finish())?.rows_affected)
    }
}

/// Delete of a single `E` by id.
#[derive(Clone, Debug)]
pub struct DeleteOne<E: Entity> {
    inner: Delete<E>,
}

impl<E: Entity> DeleteOne<E> {
    pub(crate) fn new(config: Config, id: i64) -> Self {
        Self {
            inner: Delete::new(config).filter(Predicate::eq(E::schema().id_column, id)),
        }
    }

    /// Returns `1` when the row was removed and `0` when no row had the id.
    pub fn exec(self, ctx: &Context) -> Result<usize, EntError> {
        self.inner.exec(ctx)
    }
}

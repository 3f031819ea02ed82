use std::marker::PhantomData;

use super::load;
use crate::{
    client::Config,
    context::Context,
    dialect::Dialect,
    entity::Entity,
    errors::EntError,
    neighbors::Selector,
    sql::{Order, Predicate, Scope, SqlBuilder, Statement},
};

/// Largest row count MySQL accepts in `LIMIT`; stands in for "no limit".
const MYSQL_NO_LIMIT: &str = "18446744073709551615";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Projection {
    Entities,
    Ids,
    Count,
}

/// Retrieval builder for entities of type `E`.
///
/// Without an explicit [`Order`], rows come back ordered by id ascending.
#[derive(Clone, Debug)]
pub struct Query<E: Entity> {
    config: Config,
    selector: Option<Selector>,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    limit: Option<usize>,
    offset: Option<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            selector: None,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            _entity: PhantomData,
        }
    }

    /// A query pre-filtered by a compiled edge step.
    pub(crate) fn from_selector(config: Config, selector: Selector) -> Self {
        Self {
            selector: Some(selector),
            ..Self::new(config)
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// All matching entities; an empty result is not an error.
    pub fn all(self, ctx: &Context) -> Result<Vec<E>, EntError> {
        let stmt = self.statement(Projection::Entities)?;
        load(&self.config, ctx, &stmt)
    }

    /// Exactly one entity: `NotFound` on none, `NotSingular` on more.
    pub fn only(self, ctx: &Context) -> Result<E, EntError> {
        let mut found = self.limit(2).all(ctx)?;
        match found.len() {
            0 => Err(EntError::not_found(E::schema().label())),
            1 => Ok(found.remove(0)),
            _ => Err(EntError::not_singular(E::schema().label())),
        }
    }

    /// The first entity in query order; `NotFound` on none.
    pub fn first(self, ctx: &Context) -> Result<E, EntError> {
        self.limit(1)
            .all(ctx)?
            .into_iter()
            .next()
            .ok_or_else(|| EntError::not_found(E::schema().label()))
    }

    pub fn count(self, ctx: &Context) -> Result<usize, EntError> {
        let stmt = self.statement(Projection::Count)?;
        let rows = self.config.driver().query(ctx, &stmt)?;
        let count = match rows.first() {
            Some(row) => row.int("count")?,
            None => 0,
        };
        usize::try_from(count).map_err(|_| EntError::decode(format!("negative count {count}")))
    }

    pub fn ids(self, ctx: &Context) -> Result<Vec<i64>, EntError> {
        let stmt = self.statement(Projection::Ids)?;
        let id_column = E::schema().id_column;
        self.config
            .driver()
            .query(ctx, &stmt)?
            .iter()
            .map(|row| row.int(id_column))
            .collect()
    }

    pub fn only_id(self, ctx: &Context) -> Result<i64, EntError> {
        let ids = self.limit(2).ids(ctx)?;
        match ids.as_slice() {
            [] => Err(EntError::not_found(E::schema().label())),
            [id] => Ok(*id),
            _ => Err(EntError::not_singular(E::schema().label())),
        }
    }

    pub fn first_id(self, ctx: &Context) -> Result<i64, EntError> {
        self.limit(1)
            .ids(ctx)?
            .first()
            .copied()
            .ok_or_else(|| EntError::not_found(E::schema().label()))
    }

    pub fn exist(self, ctx: &Context) -> Result<bool, EntError> {
        Ok(!self.limit(1).ids(ctx)?.is_empty())
    }

    fn statement(&self, projection: Projection) -> Result<Statement, EntError> {
        let schema = E::schema();
        let scope = Scope::new(schema, self.config.registry());
        let mut b = SqlBuilder::new(self.config.dialect());
        let windowed = self.limit.is_some() || self.offset.is_some();
        match projection {
            Projection::Entities => {
                b.push("SELECT ").columns(schema.table, &schema.columns());
            }
            Projection::Ids => {
                b.push("SELECT ").column(schema.table, schema.id_column);
            }
            Projection::Count if windowed => {
                b.push("SELECT COUNT(*) AS ")
                    .ident("count")
                    .push(" FROM (SELECT ")
                    .column(schema.table, schema.id_column);
            }
            Projection::Count => {
                b.push("SELECT COUNT(*) AS ").ident("count");
            }
        }
        match &self.selector {
            Some(selector) => selector.render_from(&mut b),
            None => {
                b.push(" FROM ").ident(schema.table);
            }
        }
        let mut predicates = Vec::with_capacity(self.predicates.len() + 1);
        if let Some(selector) = &self.selector {
            predicates.push(selector.predicate.clone());
        }
        predicates.extend(self.predicates.iter().cloned());
        if !predicates.is_empty() {
            b.push(" WHERE ");
            scope.conjunction(&mut b, &predicates)?;
        }
        if projection != Projection::Count {
            self.render_order(&mut b)?;
        }
        self.render_window(&mut b);
        if projection == Projection::Count && windowed {
            b.push(") AS ").ident("windowed");
        }
        Ok(b.finish())
    }

    fn render_order(&self, b: &mut SqlBuilder) -> Result<(), EntError> {
        let schema = E::schema();
        b.push(" ORDER BY ");
        if self.order.is_empty() {
            b.column(schema.table, schema.id_column).push(" ASC");
            return Ok(());
        }
        let columns = schema.columns();
        for (idx, order) in self.order.iter().enumerate() {
            if !columns.contains(&order.column) {
                return Err(EntError::invalid_input(format!(
                    "unknown order column {} on {}",
                    order.column, schema.table
                )));
            }
            if idx > 0 {
                b.push(", ");
            }
            b.column(schema.table, order.column)
                .push(if order.desc { " DESC" } else { " ASC" });
        }
        Ok(())
    }

    fn render_window(&self, b: &mut SqlBuilder) {
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                b.push(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    b.push(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => {
                match self.config.dialect() {
                    Dialect::Sqlite => {
                        b.push(" LIMIT -1");
                    }
                    Dialect::MySql => {
                        b.push(" LIMIT ").push(MYSQL_NO_LIMIT);
                    }
                    Dialect::Postgres => {}
                }
                b.push(&format!(" OFFSET {offset}"));
            }
            (None, None) => {}
        }
    }
}

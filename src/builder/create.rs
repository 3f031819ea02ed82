use std::marker::PhantomData;

use super::{EdgePlan, Mutation, with_tx};
use crate::{
    client::Config,
    context::Context,
    dialect::Dialect,
    driver::Row,
    entity::Entity,
    errors::EntError,
    schema::Rel,
    sql::SqlBuilder,
    value::Value,
};

/// Insert builder for one entity of type `E`.
#[derive(Clone, Debug)]
pub struct Create<E: Entity> {
    config: Config,
    mutation: Mutation,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Create<E> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            mutation: Mutation::default(),
            _entity: PhantomData,
        }
    }

    pub fn set<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.mutation.set(E::schema(), field, value.into());
        self
    }

    /// Points the many-to-one `edge` at `id`.
    pub fn set_edge_id(mut self, edge: &str, id: i64) -> Self {
        self.mutation.set_edge(edge, id);
        self
    }

    /// Attaches existing entities through a one-to-many or many-to-many `edge`.
    pub fn add_edge_ids<I: IntoIterator<Item = i64>>(mut self, edge: &str, ids: I) -> Self {
        self.mutation.add_edge_ids(edge, ids.into_iter().collect());
        self
    }

    /// Inserts the entity and returns it with its new id.
    ///
    /// Validation failures are reported before any statement is issued.
    /// Edge writes beyond the row itself run in a transaction with the insert.
    pub fn save(mut self, ctx: &Context) -> Result<E, EntError> {
        let plan = self.prepare()?;
        if plan.writes.is_empty() {
            return insert(&self.config, ctx, &self.mutation, &plan);
        }
        with_tx(&self.config, ctx, |config| {
            let created: E = insert(config, ctx, &self.mutation, &plan)?;
            plan.apply(config, ctx, E::schema(), created.id())?;
            Ok(created)
        })
    }

    fn prepare(&mut self) -> Result<EdgePlan, EntError> {
        let schema = E::schema();
        self.mutation.recorded_error()?;
        self.mutation.apply_defaults(schema);
        self.mutation.check_create(schema)?;
        let plan = self.mutation.edge_plan(self.config.registry(), schema)?;
        for edge in schema.edges {
            if !edge.required || edge.rel != Rel::ManyToOne {
                continue;
            }
            let set = edge
                .fk_column()
                .and_then(|column| plan.key(column))
                .is_some_and(|value| !value.is_null());
            if !set {
                return Err(EntError::validation(edge.name, "missing required edge"));
            }
        }
        Ok(plan)
    }
}

fn insert<E: Entity>(
    config: &Config,
    ctx: &Context,
    mutation: &Mutation,
    plan: &EdgePlan,
) -> Result<E, EntError> {
    let schema = E::schema();
    let assignments = mutation.assignments(plan);
    let dialect = config.dialect();
    let mut b = SqlBuilder::new(dialect);
    b.push("INSERT INTO ").ident(schema.table);
    if assignments.is_empty() {
        match dialect {
            Dialect::MySql => b.push(" () VALUES ()"),
            Dialect::Sqlite | Dialect::Postgres => b.push(" DEFAULT VALUES"),
        };
    } else {
        let columns: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
        b.push(" (").idents(&columns).push(") VALUES (");
        for (idx, (_, value)) in assignments.iter().enumerate() {
            if idx > 0 {
                b.push(", ");
            }
            b.arg(value.clone());
        }
        b.push(")");
    }
    let id = if dialect == Dialect::Postgres {
        b.push(" RETURNING ").ident(schema.id_column);
        let rows = config.driver().query(ctx, &b.finish())?;
        rows.first()
            .ok_or_else(|| EntError::driver("insert returned no id"))?
            .int(schema.id_column)?
    } else {
        config.driver().exec(ctx, &b.finish())?.last_insert_id
    };

    let mut pairs = Vec::with_capacity(1 + schema.fields.len() + schema.foreign_keys.len());
    pairs.push((schema.id_column, Value::Int(id)));
    for field in schema.fields {
        let value = mutation.value(field.name).cloned().unwrap_or(Value::Null);
        pairs.push((field.name, value));
    }
    for column in schema.foreign_keys {
        let value = plan.key(column).cloned().unwrap_or(Value::Null);
        pairs.push((*column, value));
    }
    E::from_row(&Row::from_pairs(pairs))
}

/// Inserts several entities of type `E` in one transaction.
#[derive(Clone, Debug)]
pub struct CreateBulk<E: Entity> {
    config: Config,
    builders: Vec<Create<E>>,
}

impl<E: Entity> CreateBulk<E> {
    pub(crate) fn new(config: Config, builders: Vec<Create<E>>) -> Self {
        Self { config, builders }
    }

    /// Every builder is validated before the first insert runs.
    pub fn save(self, ctx: &Context) -> Result<Vec<E>, EntError> {
        let mut prepared = Vec::with_capacity(self.builders.len());
        for mut builder in self.builders {
            let plan = builder.prepare()?;
            prepared.push((builder.mutation, plan));
        }
        if prepared.is_empty() {
            return Ok(Vec::new());
        }
        with_tx(&self.config, ctx, |config| {
            let mut created = Vec::with_capacity(prepared.len());
            for (mutation, plan) in &prepared {
                let entity: E = insert(config, ctx, mutation, plan)?;
                plan.apply(config, ctx, E::schema(), entity.id())?;
                created.push(entity);
            }
            Ok(created)
        })
    }
}

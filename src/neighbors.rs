//! Edge traversal: resolving a declared edge into a [`Step`] and compiling
//! the step into a pre-filtered selection over the target table.
//!
//! The compilation rules per cardinality, with `S` the source row:
//!
//! - `ManyToOne`: `SELECT .. FROM target WHERE target.id = <S.fk>`, the fk
//!   value being read from the source record when the step is resolved.
//! - `OneToMany`: `SELECT .. FROM target WHERE target.fk = <S.id>`.
//! - `ManyToMany`: `SELECT .. FROM target JOIN assoc ON assoc.target = target.id
//!   WHERE assoc.source = <S.id>`.
//!
//! Nothing here is cached; every call recomputes the step from the registry.

use crate::{
    entity::Entity,
    errors::EntError,
    schema::{EdgeDescriptor, EdgeRegistry, Rel},
    sql::{Column, Predicate, Scope, SqlBuilder},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepFrom {
    pub table: &'static str,
    pub column: &'static str,
    pub id: i64,
    /// Foreign-key value carried by the source record; only read for `ManyToOne`.
    pub key: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepTo {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepEdge {
    pub rel: Rel,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// A resolved traversal instruction; needs no further metadata lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub from: StepFrom,
    pub to: StepTo,
    pub edge: StepEdge,
}

impl Step {
    pub fn new(from: StepFrom, to: StepTo, edge: StepEdge) -> Self {
        Self { from, to, edge }
    }

    /// Resolves `edge` of `source` through the registry.
    pub fn resolve<S: Entity>(
        registry: &EdgeRegistry,
        source: &S,
        edge: &str,
    ) -> Result<(Step, &'static EdgeDescriptor), EntError> {
        let schema = S::schema();
        let descriptor = registry.edge(schema.name, edge)?;
        let target = registry.entity(descriptor.target)?;
        let key = match (descriptor.rel, descriptor.fk_column()) {
            (Rel::ManyToOne, Some(column)) => source.foreign_key(column),
            _ => None,
        };
        let step = Step::new(
            StepFrom {
                table: schema.table,
                column: schema.id_column,
                id: source.id(),
                key,
            },
            StepTo {
                table: target.table,
                column: target.id_column,
            },
            StepEdge {
                rel: descriptor.rel,
                table: descriptor.table,
                columns: descriptor.columns,
            },
        );
        Ok((step, descriptor))
    }
}

/// `JOIN table ON table.column = <base>.target_column`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Join {
    pub table: &'static str,
    pub column: &'static str,
    pub target_column: &'static str,
}

/// Base table, optional join and the filter a step compiles to.
#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    pub table: &'static str,
    pub join: Option<Join>,
    pub predicate: Predicate,
}

impl Selector {
    pub(crate) fn render_from(&self, b: &mut SqlBuilder) {
        b.push(" FROM ").ident(self.table);
        if let Some(join) = &self.join {
            b.push(" JOIN ")
                .ident(join.table)
                .push(" ON ")
                .column(join.table, join.column)
                .push(" = ")
                .column(self.table, join.target_column);
        }
    }
}

/// Compiles a step into a selection over its target table.
pub fn neighbors(step: &Step) -> Result<Selector, EntError> {
    let to = &step.to;
    match step.edge.rel {
        Rel::ManyToOne => {
            // A NULL key has no neighbor.
            let predicate = match step.from.key {
                Some(key) => Predicate::eq(Column::qualified(to.table, to.column), key),
                None => Predicate::Never,
            };
            Ok(Selector {
                table: to.table,
                join: None,
                predicate,
            })
        }
        Rel::OneToMany => {
            let fk = edge_column(step, 0)?;
            Ok(Selector {
                table: to.table,
                join: None,
                predicate: Predicate::eq(Column::qualified(to.table, fk), step.from.id),
            })
        }
        Rel::ManyToMany => {
            let source_column = edge_column(step, 0)?;
            let target_column = edge_column(step, 1)?;
            Ok(Selector {
                table: to.table,
                join: Some(Join {
                    table: step.edge.table,
                    column: target_column,
                    target_column: to.column,
                }),
                predicate: Predicate::eq(
                    Column::qualified(step.edge.table, source_column),
                    step.from.id,
                ),
            })
        }
    }
}

fn edge_column(step: &Step, idx: usize) -> Result<&'static str, EntError> {
    step.edge.columns.get(idx).copied().ok_or_else(|| {
        EntError::invalid_input(format!(
            "{:?} step over {} is missing column {idx}",
            step.edge.rel, step.edge.table
        ))
    })
}

/// Renders the `has_edge`/`has_edge_with` filter of `edge` for rows of `scope`.
pub(crate) fn render_has_edge(
    b: &mut SqlBuilder,
    scope: &Scope<'_>,
    edge: &EdgeDescriptor,
    with: Option<&[Predicate]>,
) -> Result<(), EntError> {
    let source = scope.schema;
    let target = scope.registry.entity(edge.target)?;
    let inner = Scope::new(target, scope.registry);
    let with = with.filter(|preds| !preds.is_empty());
    match edge.rel {
        Rel::ManyToOne => {
            let fk = edge
                .fk_column()
                .ok_or_else(|| EntError::schema(format!("edge {} has no column", edge.name)))?;
            b.column(source.table, fk);
            match with {
                None => {
                    b.push(" IS NOT NULL");
                }
                Some(preds) => {
                    b.push(" IN (SELECT ")
                        .column(target.table, target.id_column)
                        .push(" FROM ")
                        .ident(target.table)
                        .push(" WHERE ");
                    inner.conjunction(b, preds)?;
                    b.push(")");
                }
            }
        }
        Rel::OneToMany => {
            let fk = edge
                .fk_column()
                .ok_or_else(|| EntError::schema(format!("edge {} has no column", edge.name)))?;
            b.column(source.table, source.id_column)
                .push(" IN (SELECT ")
                .column(target.table, fk)
                .push(" FROM ")
                .ident(target.table)
                .push(" WHERE ")
                .column(target.table, fk)
                .push(" IS NOT NULL");
            if let Some(preds) = with {
                b.push(" AND ");
                inner.conjunction(b, preds)?;
            }
            b.push(")");
        }
        Rel::ManyToMany => {
            let (source_column, target_column) = edge.join_columns().ok_or_else(|| {
                EntError::schema(format!("edge {} needs two join columns", edge.name))
            })?;
            b.column(source.table, source.id_column)
                .push(" IN (SELECT ")
                .column(edge.table, source_column)
                .push(" FROM ")
                .ident(edge.table);
            if let Some(preds) = with {
                b.push(" JOIN ")
                    .ident(target.table)
                    .push(" ON ")
                    .column(edge.table, target_column)
                    .push(" = ")
                    .column(target.table, target.id_column)
                    .push(" WHERE ");
                inner.conjunction(b, preds)?;
            }
            b.push(")");
        }
    }
    Ok(())
}

//! Schema creation from entity metadata.
//!
//! Only idempotent `CREATE ... IF NOT EXISTS` statements are produced; there
//! is no versioning and no column diffing. Tables are ordered so that a
//! table is created after every table its foreign keys reference, and
//! many-to-many join tables come last.

use ahash::AHashSet;

use crate::{
    builder::with_tx,
    client::Config,
    context::Context,
    dialect::Dialect,
    errors::EntError,
    schema::{EdgeDescriptor, EntitySchema, FieldKind, FieldSchema, Rel},
    sql::{SqlBuilder, Statement},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub tables: Vec<String>,
    pub statements: Vec<String>,
    pub dry_run: bool,
}

/// Row count of one entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub entity: &'static str,
    pub table: &'static str,
    pub rows: usize,
}

pub struct Schema {
    config: Config,
}

impl Schema {
    pub(crate) fn new(config: Config) -> Self {
        Self { config }
    }

    /// Statements [`Schema::create`] would run, without running them.
    pub fn plan(&self) -> Result<MigrationReport, EntError> {
        let (tables, statements) = self.statements()?;
        Ok(MigrationReport {
            tables,
            statements,
            dry_run: true,
        })
    }

    /// Creates every missing table and index in one transaction.
    pub fn create(&self, ctx: &Context) -> Result<MigrationReport, EntError> {
        let (tables, statements) = self.statements()?;
        with_tx(&self.config, ctx, |config| {
            for sql in &statements {
                config
                    .driver()
                    .exec(ctx, &Statement::new(sql.as_str()))
                    .map_err(|e| match e {
                        EntError::DriverError(msg) => EntError::schema(format!("{sql}: {msg}")),
                        other => other,
                    })?;
            }
            Ok(())
        })?;
        tracing::debug!(tables = tables.len(), "schema created");
        Ok(MigrationReport {
            tables,
            statements,
            dry_run: false,
        })
    }

    /// Row counts per entity table, in creation order.
    pub fn status(&self, ctx: &Context) -> Result<Vec<TableStatus>, EntError> {
        let mut out = Vec::new();
        for schema in self.ordered() {
            let mut b = SqlBuilder::new(self.config.dialect());
            b.push("SELECT COUNT(*) AS ")
                .ident("count")
                .push(" FROM ")
                .ident(schema.table);
            let rows = self.config.driver().query(ctx, &b.finish())?;
            let count = match rows.first() {
                Some(row) => row.int("count")?,
                None => 0,
            };
            let rows = usize::try_from(count)
                .map_err(|_| EntError::decode(format!("negative count {count}")))?;
            out.push(TableStatus {
                entity: schema.name,
                table: schema.table,
                rows,
            });
        }
        Ok(out)
    }

    fn statements(&self) -> Result<(Vec<String>, Vec<String>), EntError> {
        let dialect = self.config.dialect();
        let mut tables = Vec::new();
        let mut statements = Vec::new();
        for schema in self.ordered() {
            statements.push(self.entity_table(dialect, schema)?);
            tables.push(schema.table.to_string());
            if dialect != Dialect::MySql {
                for column in schema.foreign_keys {
                    statements.push(fk_index(dialect, schema.table, column));
                }
            }
        }
        let mut seen = AHashSet::new();
        for edge in self.config.registry().edges() {
            if edge.rel == Rel::ManyToMany && seen.insert(edge.table) {
                statements.push(self.join_table(dialect, edge)?);
                tables.push(edge.table.to_string());
            }
        }
        Ok((tables, statements))
    }

    /// Entities ordered so referenced tables come first; ties keep name order.
    fn ordered(&self) -> Vec<&'static EntitySchema> {
        let registry = self.config.registry();
        let mut pending = registry.entities();
        let mut done: Vec<&'static EntitySchema> = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|schema| {
                references(schema).all(|target| {
                    target == schema.name || done.iter().any(|d| d.name == target)
                })
            });
            match ready {
                Some(idx) => done.push(pending.remove(idx)),
                None => {
                    tracing::warn!(
                        entities = ?pending.iter().map(|s| s.name).collect::<Vec<_>>(),
                        "foreign keys form a cycle; creating remaining tables in name order"
                    );
                    done.append(&mut pending);
                }
            }
        }
        done
    }

    fn entity_table(&self, dialect: Dialect, schema: &EntitySchema) -> Result<String, EntError> {
        let registry = self.config.registry();
        let mut b = SqlBuilder::new(dialect);
        b.push("CREATE TABLE IF NOT EXISTS ")
            .ident(schema.table)
            .push(" (")
            .ident(schema.id_column)
            .push(match dialect {
                Dialect::Sqlite => " INTEGER PRIMARY KEY AUTOINCREMENT",
                Dialect::MySql => " bigint AUTO_INCREMENT NOT NULL PRIMARY KEY",
                Dialect::Postgres => " bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
            });
        for field in schema.fields {
            b.push(", ").ident(field.name).push(" ");
            b.push(column_type(dialect, field));
            if !field.optional {
                b.push(" NOT NULL");
            }
            if field.unique {
                b.push(" UNIQUE");
            }
        }
        for column in schema.foreign_keys {
            b.push(", ").ident(column).push(" ").push(id_type(dialect)).push(" NULL");
        }
        for column in schema.foreign_keys {
            let Some(edge) = owning_edge(schema, column) else {
                continue;
            };
            let target = registry.entity(edge.target)?;
            b.push(", FOREIGN KEY (")
                .ident(column)
                .push(") REFERENCES ")
                .ident(target.table)
                .push(" (")
                .ident(target.id_column)
                .push(") ON DELETE SET NULL");
        }
        b.push(")");
        Ok(b.finish().sql)
    }

    fn join_table(&self, dialect: Dialect, edge: &EdgeDescriptor) -> Result<String, EntError> {
        let registry = self.config.registry();
        let (source_column, target_column) = edge.join_columns().ok_or_else(|| {
            EntError::schema(format!("edge {} needs two join columns", edge.name))
        })?;
        let source = registry.entity(edge.source)?;
        let target = registry.entity(edge.target)?;
        let mut b = SqlBuilder::new(dialect);
        b.push("CREATE TABLE IF NOT EXISTS ").ident(edge.table).push(" (");
        for column in [source_column, target_column] {
            b.ident(column).push(" ").push(id_type(dialect)).push(" NOT NULL, ");
        }
        b.push("PRIMARY KEY (")
            .idents(&[source_column, target_column])
            .push(")");
        for (column, referenced) in [(source_column, source), (target_column, target)] {
            b.push(", FOREIGN KEY (")
                .ident(column)
                .push(") REFERENCES ")
                .ident(referenced.table)
                .push(" (")
                .ident(referenced.id_column)
                .push(") ON DELETE CASCADE");
        }
        b.push(")");
        Ok(b.finish().sql)
    }
}

/// Entities referenced by the foreign keys stored on `schema`.
fn references(schema: &EntitySchema) -> impl Iterator<Item = &'static str> + '_ {
    schema
        .foreign_keys
        .iter()
        .filter_map(|column| owning_edge(schema, column))
        .map(|edge| edge.target)
}

fn owning_edge(schema: &EntitySchema, column: &str) -> Option<&'static EdgeDescriptor> {
    schema
        .edges
        .iter()
        .find(|edge| edge.rel == Rel::ManyToOne && edge.fk_column() == Some(column))
}

fn fk_index(dialect: Dialect, table: &str, column: &str) -> String {
    let mut b = SqlBuilder::new(dialect);
    b.push("CREATE INDEX IF NOT EXISTS ")
        .ident(&format!("{table}_{column}"))
        .push(" ON ")
        .ident(table)
        .push(" (")
        .ident(column)
        .push(")");
    b.finish().sql
}

fn id_type(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "INTEGER",
        Dialect::MySql | Dialect::Postgres => "bigint",
    }
}

fn column_type(dialect: Dialect, field: &FieldSchema) -> &'static str {
    match (dialect, field.kind) {
        (Dialect::Sqlite, FieldKind::Int | FieldKind::Bool) => "INTEGER",
        (Dialect::Sqlite, FieldKind::Float) => "REAL",
        (Dialect::Sqlite, _) => "TEXT",
        (Dialect::MySql, FieldKind::Int) => "bigint",
        (Dialect::MySql, FieldKind::Float) => "double",
        (Dialect::MySql, FieldKind::Bool) => "boolean",
        (Dialect::MySql, FieldKind::String | FieldKind::Enum(_)) => "varchar(255)",
        (Dialect::MySql, FieldKind::Time) => "varchar(40)",
        (Dialect::MySql, FieldKind::Json) => "json",
        (Dialect::Postgres, FieldKind::Int) => "bigint",
        (Dialect::Postgres, FieldKind::Float) => "double precision",
        (Dialect::Postgres, FieldKind::Bool) => "boolean",
        (Dialect::Postgres, FieldKind::String | FieldKind::Enum(_)) => "varchar",
        (Dialect::Postgres, FieldKind::Time) => "varchar(40)",
        (Dialect::Postgres, FieldKind::Json) => "jsonb",
    }
}

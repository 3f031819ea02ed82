//! Statements, the dialect-aware SQL builder and query predicates.

use std::fmt;

use crate::{
    dialect::Dialect,
    errors::EntError,
    neighbors,
    schema::{EdgeRegistry, EntitySchema},
    value::Value,
};

/// SQL text plus bound arguments, ready for a driver.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new<S: Into<String>>(sql: S) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<S: Into<String>>(sql: S, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query={} args=[", self.sql)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str("]")
    }
}

pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    args: Vec<Value>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// `"table"."column"`
    pub fn column(&mut self, table: &str, column: &str) -> &mut Self {
        self.ident(table).push(".").ident(column)
    }

    pub fn arg(&mut self, value: Value) -> &mut Self {
        self.args.push(value);
        let placeholder = self.dialect.placeholder(self.args.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn idents(&mut self, names: &[&str]) -> &mut Self {
        for (idx, name) in names.iter().enumerate() {
            if idx > 0 {
                self.push(", ");
            }
            self.ident(name);
        }
        self
    }

    pub fn columns(&mut self, table: &str, names: &[&str]) -> &mut Self {
        for (idx, name) in names.iter().enumerate() {
            if idx > 0 {
                self.push(", ");
            }
            self.column(table, name);
        }
        self
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }
}

/// Column reference; unqualified columns resolve against the table being queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub table: Option<&'static str>,
    pub name: &'static str,
}

impl Column {
    pub fn new(name: &'static str) -> Self {
        Self { table: None, name }
    }

    pub fn qualified(table: &'static str, name: &'static str) -> Self {
        Self {
            table: Some(table),
            name,
        }
    }
}

impl From<&'static str> for Column {
    fn from(name: &'static str) -> Self {
        Column::new(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => " = ",
            Op::Ne => " <> ",
            Op::Gt => " > ",
            Op::Ge => " >= ",
            Op::Lt => " < ",
            Op::Le => " <= ",
            Op::Like => " LIKE ",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        column: Column,
        op: Op,
        value: Value,
    },
    In {
        column: Column,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        column: Column,
        negated: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Matches no row.
    Never,
    /// Rows with at least one neighbor over `edge`, optionally restricted by
    /// predicates on the neighbor.
    HasEdge {
        edge: &'static str,
        with: Option<Vec<Predicate>>,
    },
}

impl Predicate {
    fn compare<C: Into<Column>, V: Into<Value>>(column: C, op: Op, value: V) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Eq, value)
    }

    pub fn ne<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Ne, value)
    }

    pub fn gt<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Gt, value)
    }

    pub fn ge<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Ge, value)
    }

    pub fn lt<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Lt, value)
    }

    pub fn le<C: Into<Column>, V: Into<Value>>(column: C, value: V) -> Self {
        Self::compare(column, Op::Le, value)
    }

    pub fn is_in<C, I, V>(column: C, values: I) -> Self
    where
        C: Into<Column>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<C, I, V>(column: C, values: I) -> Self
    where
        C: Into<Column>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null<C: Into<Column>>(column: C) -> Self {
        Predicate::Null {
            column: column.into(),
            negated: false,
        }
    }

    pub fn not_null<C: Into<Column>>(column: C) -> Self {
        Predicate::Null {
            column: column.into(),
            negated: true,
        }
    }

    pub fn contains<C: Into<Column>>(column: C, needle: &str) -> Self {
        Self::compare(column, Op::Like, format!("%{}%", escape_like(needle)))
    }

    pub fn has_prefix<C: Into<Column>>(column: C, prefix: &str) -> Self {
        Self::compare(column, Op::Like, format!("{}%", escape_like(prefix)))
    }

    pub fn has_suffix<C: Into<Column>>(column: C, suffix: &str) -> Self {
        Self::compare(column, Op::Like, format!("%{}", escape_like(suffix)))
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn has_edge(edge: &'static str) -> Self {
        Predicate::HasEdge { edge, with: None }
    }

    pub fn has_edge_with(edge: &'static str, with: Vec<Predicate>) -> Self {
        Predicate::HasEdge {
            edge,
            with: Some(with),
        }
    }

    pub(crate) fn render(&self, b: &mut SqlBuilder, scope: &Scope<'_>) -> Result<(), EntError> {
        match self {
            Predicate::Compare { column, op, value } => {
                scope.column(b, column)?;
                b.push(op.as_sql()).arg(value.clone());
                if *op == Op::Like {
                    match b.dialect() {
                        Dialect::MySql => b.push(" ESCAPE '\\\\'"),
                        Dialect::Sqlite | Dialect::Postgres => b.push(" ESCAPE '\\'"),
                    };
                }
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    b.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                scope.column(b, column)?;
                b.push(if *negated { " NOT IN (" } else { " IN (" });
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        b.push(", ");
                    }
                    b.arg(value.clone());
                }
                b.push(")");
            }
            Predicate::Null { column, negated } => {
                scope.column(b, column)?;
                b.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::And(items) => render_group(b, scope, items, " AND ", "1 = 1")?,
            Predicate::Or(items) => render_group(b, scope, items, " OR ", "1 = 0")?,
            Predicate::Not(inner) => {
                b.push("NOT (");
                inner.render(b, scope)?;
                b.push(")");
            }
            Predicate::Never => {
                b.push("1 = 0");
            }
            Predicate::HasEdge { edge, with } => {
                let edge = scope.registry.edge(scope.schema.name, edge)?;
                neighbors::render_has_edge(b, scope, edge, with.as_deref())?;
            }
        }
        Ok(())
    }
}

fn render_group(
    b: &mut SqlBuilder,
    scope: &Scope<'_>,
    items: &[Predicate],
    separator: &str,
    empty: &str,
) -> Result<(), EntError> {
    if items.is_empty() {
        b.push(empty);
        return Ok(());
    }
    b.push("(");
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            b.push(separator);
        }
        item.render(b, scope)?;
    }
    b.push(")");
    Ok(())
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Table a predicate list is rendered against.
pub(crate) struct Scope<'a> {
    pub schema: &'static EntitySchema,
    pub registry: &'a EdgeRegistry,
}

impl<'a> Scope<'a> {
    pub fn new(schema: &'static EntitySchema, registry: &'a EdgeRegistry) -> Self {
        Self { schema, registry }
    }

    fn column(&self, b: &mut SqlBuilder, column: &Column) -> Result<(), EntError> {
        match column.table {
            Some(table) => {
                b.column(table, column.name);
            }
            None => {
                let known = column.name == self.schema.id_column
                    || self.schema.field(column.name).is_some()
                    || self.schema.has_foreign_key(column.name);
                if !known {
                    return Err(EntError::invalid_input(format!(
                        "unknown column {} on {}",
                        column.name, self.schema.table
                    )));
                }
                b.column(self.schema.table, column.name);
            }
        }
        Ok(())
    }

    /// Renders `AND`-joined predicates; nothing is written for an empty list.
    pub fn conjunction(
        &self,
        b: &mut SqlBuilder,
        predicates: &[Predicate],
    ) -> Result<(), EntError> {
        for (idx, predicate) in predicates.iter().enumerate() {
            if idx > 0 {
                b.push(" AND ");
            }
            predicate.render(b, self)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub desc: bool,
}

impl Order {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            desc: false,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        Self { column, desc: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldKind, FieldSchema};

    static ITEMS: EntitySchema = EntitySchema {
        name: "Item",
        table: "items",
        id_column: "id",
        fields: &[
            FieldSchema::new("name", FieldKind::String),
            FieldSchema::new("size", FieldKind::Int),
        ],
        foreign_keys: &[],
        edges: &[],
    };

    fn render(dialect: Dialect, predicate: &Predicate) -> Result<Statement, EntError> {
        let registry = EdgeRegistry::new(&[&ITEMS])?;
        let scope = Scope::new(&ITEMS, &registry);
        let mut b = SqlBuilder::new(dialect);
        predicate.render(&mut b, &scope)?;
        Ok(b.finish())
    }

    #[test]
    fn test_render_compare_and_group() {
        let stmt = render(
            Dialect::Sqlite,
            &Predicate::or(vec![
                Predicate::eq("name", "a"),
                Predicate::gt("size", 3_i64),
            ]),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            r#"("items"."name" = ? OR "items"."size" > ?)"#
        );
        assert_eq!(stmt.args, vec![Value::from("a"), Value::Int(3)]);
    }

    #[test]
    fn test_render_postgres_placeholders_are_numbered() {
        let stmt = render(
            Dialect::Postgres,
            &Predicate::is_in("size", [1_i64, 2, 3]),
        )
        .unwrap();
        assert_eq!(stmt.sql, r#""items"."size" IN ($1, $2, $3)"#);
    }

    #[test]
    fn test_render_empty_in_matches_nothing() {
        let stmt = render(Dialect::Sqlite, &Predicate::is_in("size", Vec::<i64>::new())).unwrap();
        assert_eq!(stmt.sql, "1 = 0");
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn test_like_pattern_is_escaped() {
        let stmt = render(Dialect::Sqlite, &Predicate::contains("name", "50%_off")).unwrap();
        assert_eq!(stmt.sql, r#""items"."name" LIKE ? ESCAPE '\'"#);
        assert_eq!(stmt.args, vec![Value::from("%50\\%\\_off%")]);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = render(Dialect::Sqlite, &Predicate::eq("color", "red")).unwrap_err();
        assert!(matches!(err, EntError::InvalidInput(_)));
    }

    #[test]
    fn test_statement_display_lists_args() {
        let stmt = Statement::with_args("SELECT ?", vec![Value::Int(1), Value::from("x")]);
        assert_eq!(stmt.to_string(), r#"query=SELECT ? args=[1, "x"]"#);
    }
}

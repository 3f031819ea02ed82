use std::fmt;

use crate::errors::EntError;

pub const SQLITE: &str = "sqlite3";
pub const MYSQL: &str = "mysql";
pub const POSTGRES: &str = "postgres";

/// SQL family a driver speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Accepts the fixed set of dialect names; anything else is `UnsupportedDialect`.
    pub fn from_name(name: &str) -> Result<Self, EntError> {
        match name {
            SQLITE | "sqlite" => Ok(Dialect::Sqlite),
            MYSQL => Ok(Dialect::MySql),
            POSTGRES | "postgresql" => Ok(Dialect::Postgres),
            other => Err(EntError::unsupported_dialect(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => SQLITE,
            Dialect::MySql => MYSQL,
            Dialect::Postgres => POSTGRES,
        }
    }

    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `n`-th bound argument, 1-based.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

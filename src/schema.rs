//! Entity metadata and the edge registry.
//!
//! Every entity type describes itself with a static [`EntitySchema`]: table,
//! id column, typed fields, foreign-key columns and declared edges. The
//! [`EdgeRegistry`] indexes those edges by `(entity, edge)` and checks that
//! every edge is paired with a compatible inverse.

use ahash::AHashMap;

use crate::{errors::EntError, value::Value};

pub type Validator = fn(&Value) -> Result<(), String>;
pub type Generator = fn() -> Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    String,
    Time,
    Json,
    Enum(&'static [&'static str]),
}

impl FieldKind {
    /// Whether `value` may be stored in a column of this kind. Null is checked separately.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Int, Value::Int(_))
            | (FieldKind::Float, Value::Float(_) | Value::Int(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::String, Value::String(_))
            | (FieldKind::Time, Value::Time(_))
            | (FieldKind::Json, Value::Json(_)) => true,
            (FieldKind::Enum(values), Value::String(v)) => values.contains(&v.as_str()),
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Time => "time",
            FieldKind::Json => "json",
            FieldKind::Enum(_) => "enum",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub optional: bool,
    pub unique: bool,
    pub immutable: bool,
    pub sensitive: bool,
    pub default: Option<Generator>,
    pub update_default: Option<Generator>,
    pub validators: &'static [Validator],
}

impl FieldSchema {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            unique: false,
            immutable: false,
            sensitive: false,
            default: None,
            update_default: None,
            validators: &[],
        }
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub const fn default(mut self, generator: Generator) -> Self {
        self.default = Some(generator);
        self
    }

    pub const fn update_default(mut self, generator: Generator) -> Self {
        self.update_default = Some(generator);
        self
    }

    pub const fn validate(mut self, validators: &'static [Validator]) -> Self {
        self.validators = validators;
        self
    }

    /// Kind, nullability and validator check for a value about to be written.
    pub fn check(&self, value: &Value) -> Result<(), EntError> {
        if value.is_null() {
            if self.optional {
                return Ok(());
            }
            return Err(EntError::validation(self.name, "value must not be null"));
        }
        if !self.kind.accepts(value) {
            return Err(EntError::validation(
                self.name,
                format!(
                    "expected {} value, got {}",
                    self.kind.name(),
                    value.type_name()
                ),
            ));
        }
        for validator in self.validators {
            validator(value).map_err(|reason| EntError::validation(self.name, reason))?;
        }
        Ok(())
    }
}

/// Rejects empty strings.
pub fn not_empty(value: &Value) -> Result<(), String> {
    match value {
        Value::String(v) if v.is_empty() => Err("value is empty".to_string()),
        _ => Ok(()),
    }
}

/// Rejects negative integers.
pub fn non_negative(value: &Value) -> Result<(), String> {
    match value {
        Value::Int(v) if *v < 0 => Err(format!("value {v} is negative")),
        _ => Ok(()),
    }
}

/// Cardinality of an edge, seen from its source type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rel {
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Rel {
    pub fn inverse(self) -> Rel {
        match self {
            Rel::ManyToOne => Rel::OneToMany,
            Rel::OneToMany => Rel::ManyToOne,
            Rel::ManyToMany => Rel::ManyToMany,
        }
    }

    pub fn ownership(self) -> Ownership {
        match self {
            Rel::ManyToOne => Ownership::Source,
            Rel::OneToMany => Ownership::Target,
            Rel::ManyToMany => Ownership::JoinTable,
        }
    }
}

/// Which side stores the relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Source,
    Target,
    JoinTable,
}

/// A declared edge.
///
/// `table` holds the relationship: the source table for `ManyToOne`, the
/// target table for `OneToMany`, the join table for `ManyToMany`. `columns`
/// is the foreign-key column for the first two, and
/// `[source column, target column]` of the join table for `ManyToMany`.
#[derive(Clone, Copy, Debug)]
pub struct EdgeDescriptor {
    pub name: &'static str,
    pub source: &'static str,
    pub target: &'static str,
    pub rel: Rel,
    pub inverse: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub required: bool,
}

impl EdgeDescriptor {
    pub fn fk_column(&self) -> Option<&'static str> {
        match self.rel {
            Rel::ManyToOne | Rel::OneToMany => self.columns.first().copied(),
            Rel::ManyToMany => None,
        }
    }

    pub fn join_columns(&self) -> Option<(&'static str, &'static str)> {
        match (self.rel, self.columns) {
            (Rel::ManyToMany, [source, target]) => Some((*source, *target)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct EntitySchema {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub fields: &'static [FieldSchema],
    pub foreign_keys: &'static [&'static str],
    pub edges: &'static [EdgeDescriptor],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_foreign_key(&self, column: &str) -> bool {
        self.foreign_keys.contains(&column)
    }

    pub fn edge(&self, name: &str) -> Option<&'static EdgeDescriptor> {
        self.edges.iter().find(|edge| edge.name == name)
    }

    /// Id, fields and foreign keys, in storage order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(1 + self.fields.len() + self.foreign_keys.len());
        columns.push(self.id_column);
        columns.extend(self.fields.iter().map(|field| field.name));
        columns.extend(self.foreign_keys.iter().copied());
        columns
    }

    /// Lowercase label used in `NotFound`/`NotSingular` messages.
    pub fn label(&self) -> String {
        let mut label = String::with_capacity(self.name.len() + 2);
        for (idx, ch) in self.name.char_indices() {
            if ch.is_uppercase() {
                if idx > 0 {
                    label.push('_');
                }
                label.extend(ch.to_lowercase());
            } else {
                label.push(ch);
            }
        }
        label
    }
}

/// Validated index of every edge, keyed by `(entity, edge)`.
#[derive(Debug, Default)]
pub struct EdgeRegistry {
    entities: AHashMap<&'static str, &'static EntitySchema>,
    edges: AHashMap<(&'static str, &'static str), &'static EdgeDescriptor>,
}

impl EdgeRegistry {
    pub fn new(schemas: &[&'static EntitySchema]) -> Result<Self, EntError> {
        let mut registry = EdgeRegistry::default();
        for schema in schemas {
            if registry.entities.insert(schema.name, schema).is_some() {
                return Err(EntError::schema(format!(
                    "entity {} registered twice",
                    schema.name
                )));
            }
        }
        for schema in schemas {
            for edge in schema.edges {
                if edge.source != schema.name {
                    return Err(EntError::schema(format!(
                        "edge {}.{} declares source {}",
                        schema.name, edge.name, edge.source
                    )));
                }
                if registry
                    .edges
                    .insert((schema.name, edge.name), edge)
                    .is_some()
                {
                    return Err(EntError::schema(format!(
                        "edge {}.{} declared twice",
                        schema.name, edge.name
                    )));
                }
            }
        }
        for edge in registry.edges.values() {
            registry.check_pair(edge)?;
        }
        Ok(registry)
    }

    pub fn entity(&self, name: &str) -> Result<&'static EntitySchema, EntError> {
        self.entities
            .get(name)
            .copied()
            .ok_or_else(|| EntError::schema(format!("entity {name} is not registered")))
    }

    pub fn edge(&self, entity: &str, name: &str) -> Result<&'static EdgeDescriptor, EntError> {
        self.edges
            .get(&(entity, name))
            .copied()
            .ok_or_else(|| EntError::unknown_edge(entity, name))
    }

    pub fn inverse(&self, edge: &EdgeDescriptor) -> Result<&'static EdgeDescriptor, EntError> {
        self.edge(edge.target, edge.inverse)
    }

    /// Registered entities, sorted by name.
    pub fn entities(&self) -> Vec<&'static EntitySchema> {
        let mut entities: Vec<_> = self.entities.values().copied().collect();
        entities.sort_by_key(|schema| schema.name);
        entities
    }

    /// Registered edges, sorted by `(entity, edge)`.
    pub fn edges(&self) -> Vec<&'static EdgeDescriptor> {
        let mut edges: Vec<_> = self.edges.values().copied().collect();
        edges.sort_by_key(|edge| (edge.source, edge.name));
        edges
    }

    fn check_pair(&self, edge: &EdgeDescriptor) -> Result<(), EntError> {
        let label = format!("{}.{}", edge.source, edge.name);
        let source = self.entity(edge.source)?;
        let target = self.entity(edge.target).map_err(|_| {
            EntError::schema(format!("{label} targets unknown entity {}", edge.target))
        })?;
        let inverse = self.inverse(edge).map_err(|_| {
            EntError::schema(format!(
                "{label} names missing inverse {}.{}",
                edge.target, edge.inverse
            ))
        })?;
        if inverse.inverse != edge.name || inverse.target != edge.source {
            return Err(EntError::schema(format!(
                "{label} and {}.{} are not inverses of each other",
                inverse.source, inverse.name
            )));
        }
        if inverse.rel != edge.rel.inverse() {
            return Err(EntError::schema(format!(
                "{label} is {:?} but its inverse is {:?}",
                edge.rel, inverse.rel
            )));
        }
        if inverse.table != edge.table {
            return Err(EntError::schema(format!(
                "{label} uses table {} but its inverse uses {}",
                edge.table, inverse.table
            )));
        }
        match edge.rel {
            Rel::ManyToOne | Rel::OneToMany => {
                let column = edge
                    .fk_column()
                    .ok_or_else(|| EntError::schema(format!("{label} has no foreign key")))?;
                if inverse.fk_column() != Some(column) {
                    return Err(EntError::schema(format!(
                        "{label} and its inverse disagree on the foreign key"
                    )));
                }
                let (owner, expected_table) = if edge.rel == Rel::ManyToOne {
                    (source, source.table)
                } else {
                    (target, target.table)
                };
                if edge.table != expected_table || !owner.has_foreign_key(column) {
                    return Err(EntError::schema(format!(
                        "{label}: column {column} is not a foreign key of {expected_table}"
                    )));
                }
            }
            Rel::ManyToMany => {
                let (from, to) = edge
                    .join_columns()
                    .ok_or_else(|| EntError::schema(format!("{label} needs two join columns")))?;
                if inverse.join_columns() != Some((to, from)) {
                    return Err(EntError::schema(format!(
                        "{label} and its inverse disagree on join columns"
                    )));
                }
            }
        }
        Ok(())
    }
}

//! Struct (schema) model: ordered, typed field descriptors.
//!
//! A [`StructSchema`] is an ordered list of uniquely named [`Field`]s. Field order defines the
//! positional index used by rows; a name→position map is kept alongside the list so that
//! [`StructSchema::get_field_position`] is O(1).
//!
//! Schemas are usually shared as `Arc<StructSchema>` between a stream and every struct-row it
//! yields. Mutations go through copy-on-write helpers (`with_field`, `without_fields`) unless
//! the caller owns the schema and mutates it in place.
//!
//! # Example
//! ```
//! use tabstream::schema::{StructSchema, ValueType};
//!
//! let s = StructSchema::from_title_row(&["user_id", "is_active", "date_created", "name"], None);
//! assert_eq!(s.get_field_position("is_active"), Some(1));
//! assert_eq!(s.get_field("user_id").unwrap().value_type(), ValueType::Int);
//! assert_eq!(s.get_field("date_created").unwrap().value_type(), ValueType::Date);
//! ```

use crate::error::{Result, StreamError};
use crate::item::Item;
use crate::value::Value;
use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Declared type of a field's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    /// ISO calendar date stored as a `YYYY-MM-DD` string.
    Date,
    List,
}

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));

/// Name patterns used to guess a field's type from a title row. First match wins.
static NAME_HINTS: LazyLock<Vec<(Regex, ValueType)>> = LazyLock::new(|| {
    [
        (r"^(is|has)_", ValueType::Bool),
        (r"(^date_|_date$|^dt_|_dt$)", ValueType::Date),
        (r"(^id$|_id$|^cnt_|_cnt$|_count$|^n_)", ValueType::Int),
        (r"(_share$|_rate$|_ratio$|^avg_|_avg$)", ValueType::Float),
        (r"(^name$|_name$|_title$)", ValueType::Str),
    ]
    .into_iter()
    .map(|(p, t)| (Regex::new(p).expect("valid name hint"), t))
    .collect()
});

impl ValueType {
    /// Guess a type from a column name (`user_id` → Int, `is_active` → Bool, ...).
    pub fn detect_by_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        NAME_HINTS
            .iter()
            .find(|(re, _)| re.is_match(&name))
            .map_or(Self::Any, |(_, t)| *t)
    }

    /// The natural type of a concrete value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Str,
            Value::List(_) => Self::List,
        }
    }

    /// Whether a non-null value satisfies this type. Integers are accepted as floats.
    pub fn check(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_) | Value::Int(_))
            | (Self::Str, Value::Str(_))
            | (Self::List, Value::List(_)) => true,
            (Self::Date, Value::Str(s)) => DATE_RE.is_match(s),
            _ => false,
        }
    }

    /// Convert a value into this type, parsing strings where needed.
    ///
    /// Empty strings become `Null` for every type except `Str` and `Any`.
    ///
    /// # Errors
    /// Returns an error when the value cannot represent this type.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let fail = || anyhow!("cannot convert {} {value:?} to {self}", value.type_name());
        Ok(match (self, value) {
            (_, Value::Null) | (Self::Any, _) => value.clone(),
            (Self::Str, Value::Str(_)) => value.clone(),
            (Self::Str, v) => Value::Str(v.to_string()),
            (_, Value::Str(s)) if s.trim().is_empty() => Value::Null,
            (Self::Bool, Value::Bool(_)) => value.clone(),
            (Self::Bool, Value::Int(i)) => Value::Bool(*i != 0),
            (Self::Bool, Value::Str(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Value::Bool(true),
                "false" | "f" | "no" | "n" | "0" => Value::Bool(false),
                _ => return Err(fail()),
            },
            (Self::Int, Value::Int(_)) => value.clone(),
            (Self::Int, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (Self::Int, Value::Float(f)) if f.0.fract() == 0.0 => Value::Int(f.0 as i64),
            (Self::Int, Value::Str(s)) => Value::Int(s.trim().parse().map_err(|_| fail())?),
            (Self::Float, Value::Float(_)) => value.clone(),
            (Self::Float, Value::Int(i)) => Value::float(*i as f64),
            (Self::Float, Value::Str(s)) => Value::float(s.trim().parse().map_err(|_| fail())?),
            (Self::Date, Value::Str(s)) if DATE_RE.is_match(s.trim()) => {
                Value::Str(s.trim().to_string())
            }
            (Self::List, Value::List(_)) => value.clone(),
            (Self::List, Value::Str(s)) => {
                let parsed: serde_json::Value = serde_json::from_str(s).map_err(|_| fail())?;
                match Value::from_json(&parsed) {
                    v @ Value::List(_) => v,
                    _ => return Err(fail()),
                }
            }
            _ => return Err(fail()),
        })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Date => "date",
            Self::List => "list",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Representation a value is expressed in when moving between systems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// In-process [`Value`] of the field's type.
    Native,
    /// Plain text, as read from a delimited line.
    Str,
    /// SQL literal text (`'quoted'`, `NULL`, `TRUE`).
    Sql,
}

/// A value transform produced by [`Field::get_converter`].
pub type Converter = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A named, typed field descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    name: String,
    value_type: ValueType,
    nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            nullable: true,
        }
    }

    /// A field whose type is guessed from its name.
    pub fn detect(name: impl Into<String>) -> Self {
        let name = name.into();
        let value_type = ValueType::detect_by_name(&name);
        Self::new(name, value_type)
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn check_value(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.value_type.check(value)
        }
    }

    /// Convert a value into this field's type.
    ///
    /// # Errors
    /// Fails when the value cannot be converted, or converts to `Null` on a non-nullable field.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let out = self
            .value_type
            .coerce(value)
            .map_err(|e| anyhow!("field {}: {e}", self.name))?;
        if out.is_null() && !self.nullable {
            return Err(anyhow!("field {} is not nullable", self.name));
        }
        Ok(out)
    }

    /// Build a converter between two dialects for this field's type.
    pub fn get_converter(&self, src: Dialect, dst: Dialect) -> Converter {
        let ty = self.value_type;
        if src == dst {
            return Box::new(|v: &Value| Ok(v.clone()));
        }
        Box::new(move |v: &Value| {
            let native = match src {
                Dialect::Native => v.clone(),
                Dialect::Str => ty.coerce(v)?,
                Dialect::Sql => ty.coerce(&from_sql_literal(v))?,
            };
            Ok(match dst {
                Dialect::Native => native,
                Dialect::Str => Value::Str(native.to_string()),
                Dialect::Sql => Value::Str(to_sql_literal(&native)),
            })
        })
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Self::new(name, ValueType::Any)
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Self::new(name, ValueType::Any)
    }
}

impl From<(&str, ValueType)> for Field {
    fn from((name, value_type): (&str, ValueType)) -> Self {
        Self::new(name, value_type)
    }
}

fn to_sql_literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(_) | Value::Float(_) => v.to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(to_sql_literal).collect();
            format!("ARRAY[{}]", inner.join(", "))
        }
    }
}

fn from_sql_literal(v: &Value) -> Value {
    let Value::Str(s) = v else {
        return v.clone();
    };
    let t = s.trim();
    if t.eq_ignore_ascii_case("null") {
        Value::Null
    } else if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        Value::Str(t[1..t.len() - 1].replace("''", "'"))
    } else {
        Value::Str(t.to_string())
    }
}

/// Ordered list of uniquely named fields with an O(1) name index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Field>", into = "Vec<Field>")]
pub struct StructSchema {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    allow_duplicates: bool,
}

impl From<Vec<Field>> for StructSchema {
    fn from(fields: Vec<Field>) -> Self {
        let mut s = Self {
            fields,
            index: HashMap::new(),
            allow_duplicates: false,
        };
        s.reindex();
        s.allow_duplicates = s.index.len() != s.fields.len();
        s
    }
}

impl From<StructSchema> for Vec<Field> {
    fn from(s: StructSchema) -> Self {
        s.fields
    }
}

impl PartialEq for StructSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.value_type == b.value_type)
    }
}

impl Eq for StructSchema {}

impl StructSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Untyped schema from a list of column names.
    ///
    /// # Errors
    /// Fails on duplicate names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::from_fields(names.iter().map(|n| Field::from(n.as_ref())).collect())
    }

    /// # Errors
    /// Fails on duplicate names.
    pub fn from_fields(fields: Vec<Field>) -> Result<Self> {
        let mut s = Self::new();
        for f in fields {
            s.append_field(f, None, false)?;
        }
        Ok(s)
    }

    /// Build a schema from a title row, guessing each field's type from its name unless an
    /// explicit override is given. Repeated names get a numeric suffix (`a`, `a_1`, ...).
    pub fn from_title_row<S: AsRef<str>>(
        names: &[S],
        overrides: Option<&HashMap<String, ValueType>>,
    ) -> Self {
        let mut s = Self::new();
        for raw in names {
            let name = raw.as_ref().trim();
            let value_type = overrides
                .and_then(|o| o.get(name).copied())
                .unwrap_or_else(|| ValueType::detect_by_name(name));
            let mut unique = name.to_string();
            let mut n = 0;
            while s.index.contains_key(&unique) {
                n += 1;
                unique = format!("{name}_{n}");
            }
            s.push(Field::new(unique, value_type));
        }
        s
    }

    /// Permit repeated field names; lookups by name then return the first occurrence.
    #[must_use]
    pub fn with_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_at(&self, position: usize) -> Option<&Field> {
        self.fields.get(position)
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.get_field_position(name).map(|i| &self.fields[i])
    }

    /// Position of a field by name; `None` when absent.
    pub fn get_field_position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Insert a field at the end (or at the front when `before`).
    ///
    /// `default_type` replaces the type of a field given without one (`ValueType::Any`).
    ///
    /// # Errors
    /// Fails when a field with the same name exists and duplicates are not allowed.
    pub fn append_field(
        &mut self,
        field: impl Into<Field>,
        default_type: Option<ValueType>,
        before: bool,
    ) -> Result<()> {
        let mut field = field.into();
        if field.value_type == ValueType::Any
            && let Some(t) = default_type
        {
            field.value_type = t;
        }
        if !self.allow_duplicates && self.index.contains_key(&field.name) {
            return Err(StreamError::invalid(
                "append_field",
                format!("field {} already exists in {self}", field.name),
            )
            .into());
        }
        if before {
            self.fields.insert(0, field);
            self.reindex();
        } else {
            self.push(field);
        }
        Ok(())
    }

    /// Copy-on-write variant of [`StructSchema::append_field`].
    ///
    /// # Errors
    /// Same as [`StructSchema::append_field`].
    pub fn with_field(
        &self,
        field: impl Into<Field>,
        default_type: Option<ValueType>,
        before: bool,
    ) -> Result<Self> {
        let mut copy = self.clone();
        copy.append_field(field, default_type, before)?;
        Ok(copy)
    }

    /// Remove fields by name, in place.
    ///
    /// # Errors
    /// Fails if any name is unknown; the schema is left untouched in that case.
    pub fn remove_fields<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        if let Some(missing) = names.iter().find(|n| !self.contains(n.as_ref())) {
            return Err(StreamError::field_not_found(
                missing.as_ref(),
                self.to_string(),
                "remove_fields",
            )
            .into());
        }
        self.fields
            .retain(|f| !names.iter().any(|n| n.as_ref() == f.name));
        self.reindex();
        Ok(())
    }

    /// Copy-on-write variant of [`StructSchema::remove_fields`].
    ///
    /// # Errors
    /// Same as [`StructSchema::remove_fields`].
    pub fn without_fields<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut copy = self.clone();
        copy.remove_fields(names)?;
        Ok(copy)
    }

    /// Concatenate two schemas; colliding names from `other` get a `_right` suffix.
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for f in &other.fields {
            let mut f = f.clone();
            while out.index.contains_key(&f.name) {
                f.name = format!("{}_right", f.name);
            }
            out.push(f);
        }
        out
    }

    /// Check an item against this schema.
    ///
    /// Returns one human-readable message per problem; an empty list means the item is valid.
    /// Never fails by itself: the caller decides whether to raise, log or skip.
    pub fn get_validation_errors(&self, item: &Item) -> Vec<String> {
        let mut errors = Vec::new();
        match item {
            Item::Line(_) => {
                errors.push("line items have no fields to validate".to_string());
            }
            Item::Row(values) => self.check_positional(values, &mut errors),
            Item::StructRow(row) => self.check_positional(row.values(), &mut errors),
            Item::Record(record) => {
                for f in &self.fields {
                    match record.get(&f.name) {
                        Some(v) => self.check_one(f, v, &mut errors),
                        None if !f.nullable => {
                            errors.push(format!("field {}: missing", f.name));
                        }
                        None => {}
                    }
                }
            }
        }
        errors
    }

    fn check_positional(&self, values: &[Value], errors: &mut Vec<String>) {
        if values.len() != self.fields.len() {
            errors.push(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                values.len()
            ));
        }
        for (f, v) in self.fields.iter().zip(values) {
            self.check_one(f, v, errors);
        }
    }

    fn check_one(&self, f: &Field, v: &Value, errors: &mut Vec<String>) {
        if !f.check_value(v) {
            errors.push(format!(
                "field {}: expected {}{}, got {} {v:?}",
                f.name,
                f.value_type,
                if f.nullable { "" } else { " (not null)" },
                v.type_name()
            ));
        }
    }

    fn push(&mut self, field: Field) {
        self.index
            .entry(field.name.clone())
            .or_insert(self.fields.len());
        self.fields.push(field);
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, f) in self.fields.iter().enumerate() {
            self.index.entry(f.name.clone()).or_insert(i);
        }
    }
}

impl fmt::Display for StructSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Struct(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.name, field.value_type)?;
        }
        f.write_str(")")
    }
}

//! Item model: the four interchangeable encodings of one logical record.
//!
//! | kind | representation | fields addressed by |
//! |---|---|---|
//! | [`Item::Line`] | raw text | nothing (whole item only) |
//! | [`Item::Row`] | `Vec<Value>` | position |
//! | [`Item::Record`] | ordered `name → value` map | name |
//! | [`Item::StructRow`] | values + shared [`StructSchema`] | name or position |
//!
//! Field access is dispatched with a single `match` per operation. The star field
//! ([`FieldRef::Star`]) always means "the whole item".
//!
//! ```
//! use tabstream::item::{FieldRef, Item};
//! use tabstream::value::Value;
//!
//! let mut row = Item::Row(vec![Value::from(1), Value::from("a")]);
//! assert_eq!(row.get_value(&FieldRef::from(1))?, Value::from("a"));
//! row.set_value(&FieldRef::from(3), Value::from(true), false)?;
//! assert_eq!(row, Item::Row(vec![1.into(), "a".into(), Value::Null, true.into()]));
//! # anyhow::Ok(())
//! ```

use crate::error::{Result, StreamError, summarize};
use crate::schema::{Field, StructSchema, ValueType};
use crate::value::Value;
use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name → value mapping that remembers insertion order.
pub type Record = IndexMap<String, Value>;

/// Name used when a scalar without a field name is merged into a record.
pub const MERGE_FALLBACK_FIELD: &str = "_right";

/// Tag identifying how the items of a stream are encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Line,
    Row,
    Record,
    StructRow,
    /// Not known yet; resolved from the first item seen.
    #[default]
    Any,
}

impl ItemType {
    /// The kind of a concrete item.
    pub const fn of(item: &Item) -> Self {
        match item {
            Item::Line(_) => Self::Line,
            Item::Row(_) => Self::Row,
            Item::Record(_) => Self::Record,
            Item::StructRow(_) => Self::StructRow,
        }
    }

    /// Detect the kind from the first item; `Any` when there is none.
    pub fn detect<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        items.into_iter().next().map_or(Self::Any, Self::of)
    }

    /// Whether `item` satisfies this kind's representation contract.
    pub fn is_valid(&self, item: &Item) -> bool {
        *self == Self::Any || *self == Self::of(item)
    }

    pub const fn is_positional(&self) -> bool {
        matches!(self, Self::Row | Self::StructRow)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Line => "Line",
            Self::Row => "Row",
            Self::Record => "Record",
            Self::StructRow => "StructRow",
            Self::Any => "Any",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_lowercase().as_str() {
            "line" | "lines" => Self::Line,
            "row" | "rows" => Self::Row,
            "record" | "records" => Self::Record,
            "struct_row" | "structrow" | "struct_rows" => Self::StructRow,
            "any" | "auto" => Self::Any,
            _ => return Err(StreamError::invalid("item_type", format!("unknown kind {s}")).into()),
        })
    }
}

/// Address of a field inside an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldRef {
    /// The whole item.
    Star,
    Name(String),
    Position(usize),
}

impl FieldRef {
    pub const fn is_star(&self) -> bool {
        matches!(self, Self::Star)
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for FieldRef {
    fn from(s: &str) -> Self {
        if s == "*" {
            Self::Star
        } else {
            Self::Name(s.to_string())
        }
    }
}

impl From<String> for FieldRef {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&String> for FieldRef {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<usize> for FieldRef {
    fn from(p: usize) -> Self {
        Self::Position(p)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Star => f.write_str("*"),
            Self::Name(n) => f.write_str(n),
            Self::Position(p) => write!(f, "#{p}"),
        }
    }
}

/// A row bound to a shared schema, addressable by name or position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructRow {
    values: Vec<Value>,
    schema: Arc<StructSchema>,
}

impl StructRow {
    /// Bind values to a schema, converting each value to its field's type.
    ///
    /// With `validate`, a row that still does not satisfy the schema after conversion is
    /// rejected with a validation error listing every problem.
    ///
    /// # Errors
    /// Fails when a value cannot be converted, or on validation errors.
    pub fn new(values: Vec<Value>, schema: Arc<StructSchema>, validate: bool) -> Result<Self> {
        let mut out = Vec::with_capacity(values.len());
        for (i, v) in values.into_iter().enumerate() {
            out.push(match schema.field_at(i) {
                Some(f) if validate => f.coerce(&v)?,
                Some(f) => f.coerce(&v).unwrap_or(v),
                None => v,
            });
        }
        let row = Self {
            values: out,
            schema,
        };
        if validate {
            let errors = row.schema.get_validation_errors(&Item::StructRow(row.clone()));
            if !errors.is_empty() {
                return Err(StreamError::Validation {
                    item: row.summary(),
                    messages: errors,
                }
                .into());
            }
        }
        Ok(row)
    }

    /// Bind values without conversion or checks.
    pub const fn from_parts(values: Vec<Value>, schema: Arc<StructSchema>) -> Self {
        Self { values, schema }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub const fn schema(&self) -> &Arc<StructSchema> {
        &self.schema
    }

    fn position(&self, field: &FieldRef) -> Option<usize> {
        match field {
            FieldRef::Name(n) => self.schema.get_field_position(n),
            FieldRef::Position(p) => Some(*p),
            FieldRef::Star => None,
        }
    }

    fn summary(&self) -> String {
        summarize(&format!("StructRow{:?}", self.values))
    }
}

/// One logical record in one of the four encodings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Line(String),
    Row(Vec<Value>),
    Record(Record),
    StructRow(StructRow),
}

impl Item {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line(text.into())
    }

    pub fn row<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Row(values.into_iter().map(Into::into).collect())
    }

    pub fn record<K: Into<String>, V: Into<Value>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self::Record(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub const fn item_type(&self) -> ItemType {
        ItemType::of(self)
    }

    pub fn as_line(&self) -> Option<&str> {
        match self {
            Self::Line(s) => Some(s),
            _ => None,
        }
    }

    /// Bounded debug rendering used in error messages.
    pub fn summary(&self) -> String {
        summarize(&format!("{self}"))
    }

    /// Names of the fields this item exposes; positional names (`_0`, `_1`, ...) for rows.
    pub fn field_names(&self) -> Vec<String> {
        match self {
            Self::Line(_) => Vec::new(),
            Self::Row(v) => (0..v.len()).map(|i| format!("_{i}")).collect(),
            Self::Record(r) => r.keys().cloned().collect(),
            Self::StructRow(s) => s.schema.field_names(),
        }
    }

    /// Number of fields (`1` for a line).
    pub fn width(&self) -> usize {
        match self {
            Self::Line(_) => 1,
            Self::Row(v) => v.len(),
            Self::Record(r) => r.len(),
            Self::StructRow(s) => s.values.len(),
        }
    }

    /// The whole item as a single value: text for lines, a list of values otherwise.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Line(s) => Value::Str(s.clone()),
            Self::Row(v) => Value::List(v.clone()),
            Self::Record(r) => Value::List(r.values().cloned().collect()),
            Self::StructRow(s) => Value::List(s.values.clone()),
        }
    }

    /// Read one field.
    ///
    /// # Errors
    /// `FieldNotFound` when the field is missing, `UnsupportedItemKind` when the field kind
    /// cannot address this item kind (e.g. a name on a plain row).
    pub fn get_value(&self, field: &FieldRef) -> Result<Value> {
        self.lookup(field)?.ok_or_else(|| {
            StreamError::field_not_found(field, self.summary(), "get_value").into()
        })
    }

    /// Read one field, substituting `default` when it is missing.
    ///
    /// # Errors
    /// `UnsupportedItemKind` only; missing fields never fail.
    pub fn get_value_or(&self, field: &FieldRef, default: Value) -> Result<Value> {
        Ok(self.lookup(field)?.unwrap_or(default))
    }

    /// Read one field, translating names into positions through `schema` for plain rows.
    ///
    /// # Errors
    /// Same as [`Item::get_value`]; also `FieldNotFound` when a name is unknown to `schema`.
    pub fn get_value_in(&self, field: &FieldRef, schema: Option<&StructSchema>) -> Result<Value> {
        match (self, field, schema) {
            (Self::Row(_), FieldRef::Name(n), Some(s)) => {
                let pos = s.get_field_position(n).ok_or_else(|| {
                    StreamError::field_not_found(field, self.summary(), "get_value")
                        .because(format!("not in {s}"))
                })?;
                self.get_value(&FieldRef::Position(pos))
            }
            _ => self.get_value(field),
        }
    }

    fn lookup(&self, field: &FieldRef) -> Result<Option<Value>> {
        if field.is_star() {
            return Ok(Some(self.to_value()));
        }
        Ok(match (self, field) {
            (Self::Row(v), FieldRef::Position(p)) => v.get(*p).cloned(),
            (Self::Record(r), FieldRef::Name(n)) => r.get(n).cloned(),
            (Self::StructRow(s), f) => s.position(f).and_then(|p| s.values.get(p)).cloned(),
            _ => return Err(self.unsupported(field, "get_value")),
        })
    }

    /// Write one field.
    ///
    /// - rows are padded with `Null` up to the position;
    /// - records accept any name;
    /// - struct-rows extend their schema with unknown names when `update_struct`, otherwise
    ///   the write fails because the struct is locked;
    /// - lines are read-only.
    ///
    /// # Errors
    /// `UnsupportedItemKind` or `FieldNotFound` as described above.
    pub fn set_value(&mut self, field: &FieldRef, value: Value, update_struct: bool) -> Result<()> {
        if field.is_star() {
            return self.replace_whole(value);
        }
        match (&mut *self, field) {
            (Self::Row(v), FieldRef::Position(p)) => {
                if *p >= v.len() {
                    v.resize(*p + 1, Value::Null);
                }
                v[*p] = value;
            }
            (Self::Record(r), FieldRef::Name(n)) => {
                r.insert(n.clone(), value);
            }
            (Self::StructRow(s), f) => match s.position(f) {
                Some(p) if p < s.values.len() => s.values[p] = value,
                Some(p) if p < s.schema.len() => {
                    s.values.resize(p + 1, Value::Null);
                    s.values[p] = value;
                }
                _ if update_struct => {
                    let schema = Arc::make_mut(&mut s.schema);
                    s.values.resize(schema.len(), Value::Null);
                    match f {
                        FieldRef::Name(n) => {
                            schema.append_field(Field::new(n.clone(), ValueType::of(&value)), None, false)?;
                        }
                        FieldRef::Position(p) => {
                            for i in schema.len()..=*p {
                                schema.append_field(Field::new(format!("_{i}"), ValueType::Any), None, false)?;
                            }
                            s.values.resize(*p, Value::Null);
                        }
                        FieldRef::Star => unreachable!("star handled above"),
                    }
                    s.values.push(value);
                }
                _ => {
                    let summary = s.summary();
                    return Err(StreamError::field_not_found(f, summary, "set_value")
                        .because("struct locked")
                        .into());
                }
            },
            _ => return Err(self.unsupported(field, "set_value")),
        }
        Ok(())
    }

    fn replace_whole(&mut self, value: Value) -> Result<()> {
        match (&mut *self, value) {
            (Self::Row(v), Value::List(new)) => *v = new,
            (Self::StructRow(s), Value::List(new)) => s.values = new,
            (Self::Record(r), Value::List(new)) if new.len() == r.len() => {
                for (slot, v) in r.values_mut().zip(new) {
                    *slot = v;
                }
            }
            _ => return Err(self.unsupported(&FieldRef::Star, "set_value")),
        }
        Ok(())
    }

    /// Remove a field, returning its value. Rows shift the following positions left.
    ///
    /// # Errors
    /// `UnsupportedItemKind` on lines or on a name addressing a plain row.
    pub fn remove_field(&mut self, field: &FieldRef) -> Result<Option<Value>> {
        Ok(match (&mut *self, field) {
            (Self::Row(v), FieldRef::Position(p)) => (*p < v.len()).then(|| v.remove(*p)),
            (Self::Record(r), FieldRef::Name(n)) => r.shift_remove(n),
            (Self::StructRow(s), f) => match s.position(f) {
                Some(p) if p < s.values.len() => {
                    let name = s.schema.field_at(p).map(|x| x.name().to_string());
                    if let Some(name) = name {
                        Arc::make_mut(&mut s.schema).remove_fields(&[name])?;
                    }
                    Some(s.values.remove(p))
                }
                _ => None,
            },
            _ => return Err(self.unsupported(field, "remove_field")),
        })
    }

    fn unsupported(&self, field: &FieldRef, operation: &str) -> anyhow::Error {
        let detail = match (self, field) {
            (Self::Line(_), _) => "lines are read-only text; split them into rows first".to_string(),
            (_, FieldRef::Name(n)) => format!("field name {n} on positional item {}", self.summary()),
            (_, FieldRef::Position(p)) => format!("position {p} on named item {}", self.summary()),
            (_, FieldRef::Star) => format!("whole-item write on {}", self.summary()),
        };
        StreamError::unsupported(self.item_type(), operation, detail).into()
    }

    /// Split a delimited text line into a row of strings. Quoted fields are honored.
    ///
    /// # Errors
    /// Fails on malformed quoting, and with `InvalidArgument` when `delimiter` is not a
    /// single-byte (ASCII) character.
    pub fn split_line(line: &str, delimiter: char) -> Result<Vec<Value>> {
        let byte = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                StreamError::invalid("split_line", format!("delimiter {delimiter:?} is not ASCII"))
            })?;
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(byte)
            .flexible(true)
            .from_reader(line.as_bytes());
        let mut record = csv::StringRecord::new();
        reader
            .read_record(&mut record)
            .with_context(|| format!("split line {}", summarize(line)))?;
        Ok(record.iter().map(|s| Value::Str(s.to_string())).collect())
    }

    /// Join the item's values with `delimiter`; records are written as JSON objects.
    pub fn to_line(&self, delimiter: char) -> String {
        let join = |v: &[Value]| {
            v.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(&delimiter.to_string())
        };
        match self {
            Self::Line(s) => s.clone(),
            Self::Row(v) => join(v),
            Self::StructRow(s) => join(&s.values),
            Self::Record(r) => self::record_to_json(r).to_string(),
        }
    }

    /// Re-encode this item as another kind.
    ///
    /// `schema` supplies names for positional → named conversions and the field order for
    /// named → positional ones. Without it rows use positional names (`_0`, `_1`, ...) and
    /// records keep insertion order.
    ///
    /// # Errors
    /// Fails on malformed lines or when a struct-row cannot be built.
    pub fn convert(
        self,
        target: ItemType,
        schema: Option<&Arc<StructSchema>>,
        delimiter: char,
    ) -> Result<Self> {
        if target == ItemType::Any || target == self.item_type() {
            return Ok(self);
        }
        if target == ItemType::Line {
            return Ok(Self::Line(self.to_line(delimiter)));
        }
        let values = match self {
            Self::Line(s) => Self::split_line(&s, delimiter)?,
            Self::Row(v) => v,
            Self::StructRow(s) => {
                if target == ItemType::Record && schema.is_none() {
                    return Ok(Self::Record(
                        s.schema.field_names().into_iter().zip(s.values).collect(),
                    ));
                }
                s.values
            }
            Self::Record(r) => match schema {
                Some(s) => s
                    .fields()
                    .iter()
                    .map(|f| r.get(f.name()).cloned().unwrap_or_default())
                    .collect(),
                None if target == ItemType::StructRow => {
                    let s = Arc::new(StructSchema::from_names(&r.keys().collect::<Vec<_>>())?);
                    return Ok(Self::StructRow(StructRow::from_parts(
                        r.into_values().collect(),
                        s,
                    )));
                }
                None => r.into_values().collect(),
            },
        };
        Ok(match target {
            ItemType::Row => Self::Row(values),
            ItemType::Record => {
                let names = match schema {
                    Some(s) => s.field_names(),
                    None => (0..values.len()).map(|i| format!("_{i}")).collect(),
                };
                Self::Record(names.into_iter().zip(values).collect())
            }
            ItemType::StructRow => {
                let schema = match schema {
                    Some(s) => Arc::clone(s),
                    None => {
                        let names: Vec<String> = (0..values.len()).map(|i| format!("_{i}")).collect();
                        Arc::new(StructSchema::from_names(&names)?)
                    }
                };
                Self::StructRow(StructRow::new(values, schema, false)?)
            }
            ItemType::Line | ItemType::Any => unreachable!("handled above"),
        })
    }

    /// Serialize as one JSON document (arrays for rows, objects for records and struct-rows).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Line(s) => serde_json::Value::String(s.clone()),
            Self::Row(v) => serde_json::Value::Array(v.iter().map(Value::to_json).collect()),
            Self::Record(r) => record_to_json(r),
            Self::StructRow(s) => serde_json::Value::Object(
                s.schema
                    .field_names()
                    .into_iter()
                    .zip(s.values.iter().map(Value::to_json))
                    .collect(),
            ),
        }
    }
}

fn record_to_json(r: &Record) -> serde_json::Value {
    serde_json::Value::Object(r.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(s) => write!(f, "Line({s:?})"),
            Self::Row(v) => write!(f, "Row{v:?}"),
            Self::Record(r) => write!(f, "Record{r:?}"),
            Self::StructRow(s) => write!(f, "StructRow{:?}", s.values),
        }
    }
}

/// Merge two matched items for a join.
///
/// - row ⊕ row (and struct-rows): values are concatenated;
/// - record ⊕ record: right overwrites left on collisions, except for `key_fields`, which keep
///   the left value;
/// - a record merged with an unnamed scalar (a line) stores it under
///   [`MERGE_FALLBACK_FIELD`].
///
/// A missing side (outer joins) is passed as `None`; rows are then padded with `pad_width`
/// nulls so every output row has the same shape.
///
/// # Errors
/// `UnsupportedItemKind` for combinations with no sensible merge.
pub fn merge_items(
    left: Option<&Item>,
    right: Option<&Item>,
    key_fields: &[String],
    pad_width: (usize, usize),
) -> Result<Item> {
    let nulls = |n: usize| vec![Value::Null; n];
    Ok(match (left, right) {
        (None, None) => Item::Row(Vec::new()),
        (Some(Item::Line(l)), r) => merge_items(
            Some(&Item::Row(vec![Value::Str(l.clone())])),
            r,
            key_fields,
            pad_width,
        )?,
        (Some(Item::Row(l)), Some(r)) => {
            let mut out = l.clone();
            match r {
                Item::Row(v) => out.extend(v.iter().cloned()),
                Item::StructRow(s) => out.extend(s.values.iter().cloned()),
                Item::Line(s) => out.push(Value::Str(s.clone())),
                Item::Record(rec) => out.extend(rec.values().cloned()),
            }
            Item::Row(out)
        }
        (Some(Item::Row(l)), None) => {
            let mut out = l.clone();
            out.extend(nulls(pad_width.1));
            Item::Row(out)
        }
        (Some(Item::StructRow(l)), Some(Item::StructRow(r))) => {
            let schema = Arc::new(l.schema.merged(&r.schema));
            let mut values = l.values.clone();
            values.resize(l.schema.len(), Value::Null);
            values.extend(r.values.iter().cloned());
            Item::StructRow(StructRow::from_parts(values, schema))
        }
        (Some(Item::StructRow(l)), None) => Item::StructRow(l.clone()),
        (Some(Item::StructRow(l)), Some(r)) => {
            merge_items(Some(&Item::Row(l.values.clone())), Some(r), key_fields, pad_width)?
        }
        (Some(Item::Record(l)), Some(r)) => {
            let mut out = l.clone();
            let right_pairs: Vec<(String, Value)> = match r {
                Item::Record(rr) => rr.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                Item::StructRow(s) => s
                    .schema
                    .field_names()
                    .into_iter()
                    .zip(s.values.iter().cloned())
                    .collect(),
                Item::Line(s) => vec![(MERGE_FALLBACK_FIELD.to_string(), Value::Str(s.clone()))],
                Item::Row(v) => vec![(MERGE_FALLBACK_FIELD.to_string(), Value::List(v.clone()))],
            };
            for (k, v) in right_pairs {
                if key_fields.contains(&k) && out.get(&k).is_some_and(|x| !x.is_null()) {
                    continue;
                }
                out.insert(k, v);
            }
            Item::Record(out)
        }
        (Some(Item::Record(l)), None) => Item::Record(l.clone()),
        (None, Some(r)) => match r {
            Item::Row(v) => {
                let mut out = nulls(pad_width.0);
                out.extend(v.iter().cloned());
                Item::Row(out)
            }
            Item::StructRow(s) => Item::StructRow(s.clone()),
            Item::Record(rec) => Item::Record(rec.clone()),
            Item::Line(s) => {
                let mut out = nulls(pad_width.0);
                out.push(Value::Str(s.clone()));
                Item::Row(out)
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::stream_error;

    fn schema(names: &[&str]) -> Arc<StructSchema> {
        Arc::new(StructSchema::from_names(names).unwrap())
    }

    #[test]
    fn round_trip_every_kind() -> Result<()> {
        let items = vec![
            (Item::row([1, 2, 3]), FieldRef::from(1)),
            (Item::record([("a", 1), ("b", 2)]), FieldRef::from("b")),
            (
                Item::StructRow(StructRow::from_parts(vec![1.into(), 2.into()], schema(&["a", "b"]))),
                FieldRef::from("a"),
            ),
            (Item::row([1, 2]), FieldRef::Star),
        ];
        for (item, field) in items {
            let mut copy = item.clone();
            let v = copy.get_value(&field)?;
            copy.set_value(&field, v, false)?;
            assert_eq!(copy, item);
        }
        Ok(())
    }

    #[test]
    fn row_out_of_range() -> Result<()> {
        let row = Item::row([1]);
        let err = row.get_value(&FieldRef::from(5)).unwrap_err();
        assert_eq!(stream_error(&err).map(StreamError::kind), Some("field_not_found"));
        assert_eq!(row.get_value_or(&FieldRef::from(5), Value::from(-1))?, Value::from(-1));
        Ok(())
    }

    #[test]
    fn line_is_read_only() {
        let mut line = Item::line("a\tb");
        let err = line.set_value(&FieldRef::from(0), Value::Null, true).unwrap_err();
        assert_eq!(
            stream_error(&err).map(StreamError::kind),
            Some("unsupported_item_kind")
        );
        assert_eq!(line.get_value(&FieldRef::Star).unwrap(), Value::from("a\tb"));
    }

    #[test]
    fn struct_row_locked_and_extended() -> Result<()> {
        let mut item = Item::StructRow(StructRow::from_parts(vec![1.into()], schema(&["a"])));
        let err = item.set_value(&FieldRef::from("b"), 2.into(), false).unwrap_err();
        assert!(err.to_string().contains("struct locked"));
        item.set_value(&FieldRef::from("b"), 2.into(), true)?;
        assert_eq!(item.get_value(&FieldRef::from("b"))?, Value::from(2));
        assert_eq!(item.field_names(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn names_on_rows_go_through_schema() -> Result<()> {
        let row = Item::row(["x", "y"]);
        let s = StructSchema::from_names(&["a", "b"])?;
        assert_eq!(row.get_value_in(&FieldRef::from("b"), Some(&s))?, Value::from("y"));
        assert!(row.get_value(&FieldRef::from("b")).is_err());
        Ok(())
    }

    #[test]
    fn split_honors_quotes() -> Result<()> {
        let v = Item::split_line("a,\"b,c\",d", ',')?;
        assert_eq!(v, vec![Value::from("a"), Value::from("b,c"), Value::from("d")]);
        assert!(Item::split_line("", ',')?.is_empty());
        Ok(())
    }

    #[test]
    fn split_rejects_wide_delimiters() {
        for delimiter in ['¦', '→', 'é'] {
            let err = Item::split_line("a¦b", delimiter).expect_err("not ASCII");
            assert_eq!(crate::error::stream_error(&err).map(StreamError::kind), Some("invalid_argument"));
        }
    }

    #[test]
    fn conversions() -> Result<()> {
        let s = schema(&["id", "name"]);
        let rec = Item::line("1\tbob").convert(ItemType::Record, Some(&s), '\t')?;
        assert_eq!(rec, Item::record([("id", "1"), ("name", "bob")]));
        let row = rec.clone().convert(ItemType::Row, Some(&s), '\t')?;
        assert_eq!(row, Item::row(["1", "bob"]));
        let line = row.convert(ItemType::Line, None, ',')?;
        assert_eq!(line, Item::line("1,bob"));
        let sr = rec.convert(ItemType::StructRow, None, '\t')?;
        assert_eq!(sr.field_names(), vec!["id", "name"]);
        Ok(())
    }

    #[test]
    fn merge_rules() -> Result<()> {
        let keys = vec!["id".to_string()];
        let l = Item::record([("id", Value::from(1)), ("v", Value::from("l"))]);
        let r = Item::record([("id", Value::from(1)), ("v", Value::from("r")), ("w", Value::from(2))]);
        let m = merge_items(Some(&l), Some(&r), &keys, (0, 0))?;
        assert_eq!(
            m,
            Item::record([("id", Value::from(1)), ("v", Value::from("r")), ("w", Value::from(2))])
        );
        let m = merge_items(Some(&Item::row([1])), None, &keys, (1, 2))?;
        assert_eq!(m, Item::Row(vec![1.into(), Value::Null, Value::Null]));
        let m = merge_items(Some(&l), Some(&Item::line("x")), &keys, (0, 0))?;
        assert_eq!(m.get_value(&FieldRef::from(MERGE_FALLBACK_FIELD))?, Value::from("x"));
        Ok(())
    }
}

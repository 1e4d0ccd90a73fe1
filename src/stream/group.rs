//! Grouping of runs of equal keys.
//!
//! [`Stream::sorted_group_by`] assumes the input is already ordered by the key and folds every
//! run of equal keys into one output item. [`Stream::group_by`] sorts first. With
//! [`Grouping::take_hash`] the sort orders by a stable hash of the key instead of the key
//! itself, which spreads skewed keys evenly but loses the natural key order.
//!
//! Output shapes:
//!
//! - `as_pairs`: `Row[key, List[values...]]`, where `key` is the single key value or a list of
//!   them;
//! - records and struct-rows fold into a record holding the key fields followed by one list
//!   per value field;
//! - rows fold into `Row[keys..., lists...]`.

use super::sort::{Key, KeyOf, collect_keys, key_of};
use super::{ItemIter, Stream};
use crate::error::{Result, StreamError};
use crate::item::{FieldRef, Item, ItemType, Record};
use crate::schema::StructSchema;
use crate::value::Value;
use std::sync::Arc;

/// Settings of a grouping operation.
#[derive(Clone, Debug, Default)]
pub struct Grouping {
    keys: Vec<Key>,
    values: Vec<FieldRef>,
    as_pairs: bool,
    take_hash: bool,
}

impl Grouping {
    /// Group by `keys`; an empty list groups by the whole item.
    pub fn by<I>(keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        Self {
            keys: collect_keys(keys),
            ..Self::default()
        }
    }

    /// Fields collected into lists. Defaults to every non-key field.
    #[must_use]
    pub fn values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldRef>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Emit `Row[key, List[values]]` pairs instead of folded items.
    #[must_use]
    pub const fn as_pairs(mut self) -> Self {
        self.as_pairs = true;
        self
    }

    /// Order groups by a stable hash of the key (only used by [`Stream::group_by`]).
    #[must_use]
    pub const fn take_hash(mut self) -> Self {
        self.take_hash = true;
        self
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }
}

/// Iterator over `(key, items)` runs of a key-ordered stream.
pub struct Groups {
    inner: ItemIter,
    extract: KeyOf,
    current: Option<(Vec<Value>, Vec<Item>)>,
    seen: bool,
    empty_group: bool,
    done: bool,
}

impl Groups {
    pub(crate) fn new(inner: ItemIter, extract: KeyOf) -> Self {
        Self {
            inner,
            extract,
            current: None,
            seen: false,
            empty_group: false,
            done: false,
        }
    }

    /// Yield one `(no key, no items)` group when the input is empty.
    pub(crate) const fn with_empty_group(mut self, emit: bool) -> Self {
        self.empty_group = emit;
        self
    }
}

impl Iterator for Groups {
    type Item = Result<(Vec<Value>, Vec<Item>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    self.seen = true;
                    let key = match (self.extract)(&item) {
                        Ok(k) => k,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };
                    match &mut self.current {
                        Some((k, items)) if *k == key => items.push(item),
                        _ => {
                            if let Some(group) = self.current.replace((key, vec![item])) {
                                return Some(Ok(group));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if !self.seen && self.empty_group {
                        return Some(Ok((Vec::new(), Vec::new())));
                    }
                    return self.current.take().map(Ok);
                }
            }
        }
    }
}

/// Turns one `(key, items)` group into an output item.
struct Folder {
    keys: Vec<Key>,
    values: Vec<FieldRef>,
    as_pairs: bool,
    schema: Option<Arc<StructSchema>>,
}

impl Folder {
    fn fold(&self, key: Vec<Value>, items: &[Item]) -> Result<Item> {
        if self.as_pairs {
            return self.pair(key, items);
        }
        let Some(first) = items.first() else {
            return Ok(Item::Row(key));
        };
        let schema = self.schema.as_deref();
        match first {
            Item::Line(_) => Err(StreamError::unsupported(
                ItemType::Line,
                "sorted_group_by",
                "lines have no fields to fold; use as_pairs()",
            )
            .into()),
            Item::Row(_) => {
                let mut out = if self.keys.is_empty() { Vec::new() } else { key };
                for field in self.value_fields(first) {
                    out.push(self.column(&field, items)?);
                }
                Ok(Item::Row(out))
            }
            Item::Record(_) | Item::StructRow(_) => {
                let mut out = Record::new();
                for (i, (k, v)) in self.keys.iter().zip(key).enumerate() {
                    out.insert(k.output_name(i, schema), v);
                }
                for field in self.value_fields(first) {
                    let name = match &field {
                        FieldRef::Name(n) => n.clone(),
                        FieldRef::Position(p) => schema
                            .and_then(|s| s.field_at(*p))
                            .map_or_else(|| format!("_{p}"), |f| f.name().to_string()),
                        FieldRef::Star => String::from("items"),
                    };
                    out.insert(name, self.column(&field, items)?);
                }
                Ok(Item::Record(out))
            }
        }
    }

    fn pair(&self, key: Vec<Value>, items: &[Item]) -> Result<Item> {
        let key = match key.len() {
            0 => Value::Null,
            1 => key.into_iter().next().unwrap_or_default(),
            _ => Value::List(key),
        };
        let values = items
            .iter()
            .map(|item| match self.values.as_slice() {
                [] => Ok(item.to_value()),
                [one] => self.value(item, one),
                many => many
                    .iter()
                    .map(|f| self.value(item, f))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Item::Row(vec![key, Value::List(values)]))
    }

    fn value(&self, item: &Item, field: &FieldRef) -> Result<Value> {
        match field {
            FieldRef::Star => Ok(item.to_value()),
            f => item.get_value_in(f, self.schema.as_deref()),
        }
    }

    fn column(&self, field: &FieldRef, items: &[Item]) -> Result<Value> {
        items
            .iter()
            .map(|item| self.value(item, field))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    /// Explicit value fields, or every field of `first` that is not a key.
    fn value_fields(&self, first: &Item) -> Vec<FieldRef> {
        if !self.values.is_empty() {
            return self.values.clone();
        }
        match first {
            Item::Row(v) => {
                let key_positions: Vec<usize> = self
                    .keys
                    .iter()
                    .filter_map(|k| match k {
                        Key::Field(FieldRef::Position(p)) => Some(*p),
                        _ => None,
                    })
                    .collect();
                (0..v.len())
                    .filter(|p| !key_positions.contains(p))
                    .map(FieldRef::Position)
                    .collect()
            }
            other => {
                let schema = self.schema.as_deref();
                let key_names: Vec<String> = self
                    .keys
                    .iter()
                    .enumerate()
                    .map(|(i, k)| k.output_name(i, schema))
                    .collect();
                other
                    .field_names()
                    .into_iter()
                    .filter(|n| !key_names.contains(n))
                    .map(FieldRef::Name)
                    .collect()
            }
        }
    }
}

impl Stream {
    /// The `(key, items)` runs of a stream already ordered by `keys`.
    pub fn sorted_groups<I>(self, keys: I) -> Groups
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let keys = collect_keys(keys);
        let extract = key_of(&keys, self.meta.schema.as_ref(), "sorted_groups");
        let (iter, _) = self.into_parts();
        Groups::new(iter, extract)
    }

    /// Fold runs of equal keys. The input must already be ordered by the key; unordered input
    /// yields one group per run, not per distinct key.
    ///
    /// # Errors
    /// `UnsupportedItemKind` when folding lines without `as_pairs`. Per-group errors surface
    /// while the output is consumed.
    pub fn sorted_group_by(mut self, grouping: Grouping) -> Result<Self> {
        let input = self.resolve_item_type()?;
        if input == ItemType::Line && !grouping.as_pairs {
            return Err(StreamError::unsupported(
                ItemType::Line,
                "sorted_group_by",
                "lines have no fields to fold; use as_pairs()",
            )
            .into());
        }
        let extract = key_of(&grouping.keys, self.meta.schema.as_ref(), "sorted_group_by");
        let (iter, meta) = self.into_parts();
        let mut meta = meta.reshaped();
        let folder = Folder {
            keys: grouping.keys,
            values: grouping.values,
            as_pairs: grouping.as_pairs,
            schema: meta.schema.take(),
        };
        meta.item_type = match input {
            _ if folder.as_pairs => ItemType::Row,
            ItemType::Record | ItemType::StructRow => ItemType::Record,
            ItemType::Row => ItemType::Row,
            _ => ItemType::Any,
        };

        let groups = Groups::new(iter, extract).with_empty_group(folder.as_pairs);
        let out = groups.map(move |g| {
            let (key, items) = g?;
            folder.fold(key, &items)
        });
        Ok(Self::from_parts(super::Source::Lazy(Box::new(out)), meta))
    }

    /// Sort by the grouping key, then fold runs of equal keys.
    ///
    /// # Errors
    /// Sort errors and the errors of [`Stream::sorted_group_by`].
    pub fn group_by(self, grouping: Grouping) -> Result<Self> {
        let base = key_of(&grouping.keys, self.meta.schema.as_ref(), "group_by");
        let extract: KeyOf = if grouping.take_hash {
            Arc::new(move |item: &Item| {
                let key = base(item)?;
                let mut out = Vec::with_capacity(key.len() + 1);
                out.push(Value::Int(Value::stable_hash_of(&key) as i64));
                out.extend(key);
                Ok(out)
            })
        } else {
            base
        };
        self.sort_with(extract, false)?.sorted_group_by(grouping)
    }
}

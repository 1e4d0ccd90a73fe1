//! Lazy, single-pass streams of items.
//!
//! A [`Stream`] wraps an iterator of [`Item`]s together with what is known about them: the
//! declared [`ItemType`], an optional [`StructSchema`], an exact or estimated count, the
//! [`StreamConfig`] thresholds and an optional [`Logger`](crate::logger::Logger).
//!
//! Nothing is evaluated until the stream is consumed. Operators take the stream by value and
//! return a new one, so a stream can only be consumed once; use [`Stream::tee`] or
//! [`Stream::to_memory`] when the same items are needed twice.
//!
//! ## Available operations
//!
//! - Element-wise: [`map`](Stream::map), [`map_as`](Stream::map_as),
//!   [`flat_map`](Stream::flat_map), [`filter`](Stream::filter), [`select`](Stream::select)
//! - Shape: [`take`](Stream::take), [`skip`](Stream::skip), [`enumerate`](Stream::enumerate),
//!   [`chain`](Stream::chain)
//! - Conversion: [`to_lines`](Stream::to_lines), [`to_rows`](Stream::to_rows),
//!   [`to_records`](Stream::to_records), [`to_struct_rows`](Stream::to_struct_rows),
//!   [`with_title_row`](Stream::with_title_row)
//! - Buffering: [`sort`](Stream::sort), [`sorted_group_by`](Stream::sorted_group_by),
//!   [`group_by`](Stream::group_by), [`join`](Stream::join), [`uniq`](Stream::uniq),
//!   [`tee`](Stream::tee)
//! - Terminal: [`collect`](Stream::collect), [`to_memory`](Stream::to_memory),
//!   [`write_to`](Stream::write_to), [`validate`](Stream::validate)
//!
//! ## Example
//!
//! ```no_run
//! use tabstream::{Item, Key, Stream};
//!
//! # fn main() -> anyhow::Result<()> {
//! let sorted = Stream::from_items(vec![Item::row([3, 1]), Item::row([1, 2])])
//!     .sort([Key::from(0)], false)?
//!     .collect()?;
//! assert_eq!(sorted[0], Item::row([1, 2]));
//! # Ok(())
//! # }
//! ```

mod group;
mod join;
mod ops;
mod sort;
mod tee;
mod uniq;

pub use group::{Groups, Grouping};
pub use join::{Join, JoinType};
pub use ops::{Condition, Filter, ItemPredicate, ValuePredicate};
pub use sort::{Key, KeyFn};

use crate::config::StreamConfig;
use crate::connector::Connector;
use crate::error::{Result, StreamError};
use crate::item::{Item, ItemType, StructRow};
use crate::logger::{Level, SharedLogger};
use crate::schema::{Field, StructSchema, ValueType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::Arc;

/// Boxed item iterator backing a lazy stream.
pub type ItemIter = Box<dyn Iterator<Item = Result<Item>>>;

pub(crate) enum Source {
    Lazy(ItemIter),
    Memory(Vec<Item>),
}

impl Source {
    fn into_items(self) -> ItemIter {
        match self {
            Self::Lazy(it) => it,
            Self::Memory(items) => Box::new(items.into_iter().map(Ok)),
        }
    }
}

/// Everything a stream knows about its items, carried across operators.
pub(crate) struct Meta {
    pub(crate) item_type: ItemType,
    pub(crate) schema: Option<Arc<StructSchema>>,
    pub(crate) count: Option<usize>,
    pub(crate) estimated: Option<usize>,
    pub(crate) config: Arc<StreamConfig>,
    pub(crate) logger: Option<SharedLogger>,
    pub(crate) name: String,
    origins: Vec<Box<dyn Connector>>,
}

impl Meta {
    fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            schema: None,
            count: None,
            estimated: None,
            config: Arc::new(StreamConfig::default()),
            logger: None,
            name: String::from("stream"),
            origins: Vec::new(),
        }
    }

    /// Metadata for a derived stream whose length is no longer known exactly.
    pub(crate) fn reshaped(mut self) -> Self {
        self.estimated = self.count.or(self.estimated);
        self.count = None;
        self
    }

    /// Same metadata without the connectors.
    pub(crate) fn twin(&self) -> Self {
        Self {
            item_type: self.item_type,
            schema: self.schema.clone(),
            count: self.count,
            estimated: self.estimated,
            config: Arc::clone(&self.config),
            logger: self.logger.clone(),
            name: self.name.clone(),
            origins: Vec::new(),
        }
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.origins.extend(other.origins);
    }

    pub(crate) fn log(&self, message: &str, level: Level) {
        if let Some(logger) = &self.logger {
            logger.log(&format!("{}: {message}", self.name), level);
        }
    }
}

/// A lazily evaluated sequence of items.
pub struct Stream {
    source: Source,
    meta: Meta,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.meta.name)
            .field("item_type", &self.meta.item_type)
            .field("count", &self.meta.count)
            .field("in_memory", &self.is_in_memory())
            .finish_non_exhaustive()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::empty()
    }
}

impl Stream {
    pub(crate) fn from_parts(source: Source, meta: Meta) -> Self {
        Self { source, meta }
    }

    pub(crate) fn into_parts(self) -> (ItemIter, Meta) {
        (self.source.into_items(), self.meta)
    }

    fn lazy(iter: ItemIter, meta: Meta) -> Self {
        Self::from_parts(Source::Lazy(iter), meta)
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn empty() -> Self {
        let mut meta = Meta::new(ItemType::Any);
        meta.count = Some(0);
        Self::from_parts(Source::Memory(Vec::new()), meta)
    }

    /// An in-memory stream; the item type is detected from the items.
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut meta = Meta::new(ItemType::detect(&items));
        meta.count = Some(items.len());
        if let Some(Item::StructRow(s)) = items.first() {
            meta.schema = Some(Arc::clone(s.schema()));
        }
        Self::from_parts(Source::Memory(items), meta)
    }

    /// A lazy stream over `items`. When `item_type` is concrete every item is checked against it
    /// as it is produced.
    pub fn from_iterator<I>(items: I, item_type: ItemType) -> Self
    where
        I: IntoIterator<Item = Item>,
        I::IntoIter: 'static,
    {
        Self::from_results(items.into_iter().map(Ok), item_type)
    }

    /// Like [`Stream::from_iterator`] for fallible producers.
    pub fn from_results<I>(items: I, item_type: ItemType) -> Self
    where
        I: IntoIterator<Item = Result<Item>>,
        I::IntoIter: 'static,
    {
        let iter = enforce_kind(Box::new(items.into_iter()), item_type, "from_iterator");
        Self::lazy(iter, Meta::new(item_type))
    }

    /// A lazy stream of [`Item::Line`]s.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'static,
        S: Into<String>,
    {
        Self::lazy(
            Box::new(lines.into_iter().map(|l| Ok(Item::Line(l.into())))),
            Meta::new(ItemType::Line),
        )
    }

    /// Lines read from `connector`. The connector is kept with the stream (and every stream
    /// derived from it) and closed by [`Stream::close`].
    ///
    /// # Errors
    /// Fails when the connector cannot be opened.
    pub fn from_connector(mut connector: Box<dyn Connector>) -> Result<Self> {
        let lines = connector.get_lines()?;
        let mut meta = Meta::new(ItemType::Line);
        meta.name = connector.describe();
        meta.origins.push(connector);
        Ok(Self::lazy(Box::new(lines.map(|l| l.map(Item::Line))), meta))
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub const fn item_type(&self) -> ItemType {
        self.meta.item_type
    }

    pub fn schema(&self) -> Option<&Arc<StructSchema>> {
        self.meta.schema.as_ref()
    }

    /// Exact number of items, when known.
    pub const fn count(&self) -> Option<usize> {
        self.meta.count
    }

    /// Exact count if known, otherwise the best available estimate.
    pub const fn estimated_count(&self) -> Option<usize> {
        match self.meta.count {
            Some(n) => Some(n),
            None => self.meta.estimated,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.meta.config
    }

    pub const fn logger(&self) -> Option<&SharedLogger> {
        self.meta.logger.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub const fn is_in_memory(&self) -> bool {
        matches!(self.source, Source::Memory(_))
    }

    /// Borrow the items of an in-memory stream.
    pub fn items(&self) -> Option<&[Item]> {
        match &self.source {
            Source::Memory(items) => Some(items),
            Source::Lazy(_) => None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<Arc<StructSchema>>) -> Self {
        self.meta.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.meta.config = Arc::new(config);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.meta.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    /// Record a size estimate used by the sort and join strategy choice.
    #[must_use]
    pub const fn with_estimated_count(mut self, n: usize) -> Self {
        self.meta.estimated = Some(n);
        self
    }

    /// Declare the item type without converting. Items are checked lazily.
    #[must_use]
    pub fn set_item_type(self, item_type: ItemType) -> Self {
        let (iter, mut meta) = self.into_parts();
        meta.item_type = item_type;
        Self::lazy(enforce_kind(iter, item_type, "set_item_type"), meta)
    }

    /// Look at the first item without consuming it.
    ///
    /// # Errors
    /// Returns the first item's error; that error is consumed.
    pub fn get_one_item(&mut self) -> Result<Option<Item>> {
        match &mut self.source {
            Source::Memory(items) => Ok(items.first().cloned()),
            Source::Lazy(_) => {
                let Source::Lazy(mut it) = std::mem::replace(&mut self.source, Source::Memory(Vec::new()))
                else {
                    return Ok(None);
                };
                match it.next() {
                    Some(Ok(first)) => {
                        self.source = Source::Lazy(Box::new(iter::once(Ok(first.clone())).chain(it)));
                        Ok(Some(first))
                    }
                    Some(Err(e)) => {
                        self.source = Source::Lazy(it);
                        Err(e)
                    }
                    None => {
                        self.meta.count = Some(0);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Resolve [`ItemType::Any`] by peeking at the first item.
    ///
    /// # Errors
    /// Propagates the first item's error.
    pub fn resolve_item_type(&mut self) -> Result<ItemType> {
        if self.meta.item_type == ItemType::Any
            && let Some(first) = self.get_one_item()?
        {
            self.meta.item_type = first.item_type();
            if let Item::StructRow(s) = &first
                && self.meta.schema.is_none()
            {
                self.meta.schema = Some(Arc::clone(s.schema()));
            }
        }
        Ok(self.meta.item_type)
    }

    // ------------------------------------------------------------------
    // Element-wise
    // ------------------------------------------------------------------

    /// Apply `f` to every item. The output item type is unknown until observed.
    #[must_use]
    pub fn map<F>(self, mut f: F) -> Self
    where
        F: FnMut(Item) -> Result<Item> + 'static,
    {
        let (iter, mut meta) = self.into_parts();
        meta.item_type = ItemType::Any;
        Self::lazy(Box::new(iter.map(move |r| r.and_then(&mut f))), meta)
    }

    /// Apply `f` and declare the output kind; items of another kind fail when produced.
    #[must_use]
    pub fn map_as<F>(self, item_type: ItemType, f: F) -> Self
    where
        F: FnMut(Item) -> Result<Item> + 'static,
    {
        self.map(f).set_item_type(item_type)
    }

    /// Replace every item by zero or more items.
    #[must_use]
    pub fn flat_map<F, I>(self, mut f: F) -> Self
    where
        F: FnMut(Item) -> Result<I> + 'static,
        I: IntoIterator<Item = Item> + 'static,
    {
        let (iter, meta) = self.into_parts();
        let mut meta = meta.reshaped();
        meta.item_type = ItemType::Any;
        let out = iter.flat_map(move |r| -> Box<dyn Iterator<Item = Result<Item>>> {
            match r.and_then(&mut f) {
                Ok(items) => Box::new(items.into_iter().map(Ok)),
                Err(e) => Box::new(iter::once(Err(e))),
            }
        });
        Self::lazy(Box::new(out), meta)
    }

    // ------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------

    #[must_use]
    pub fn take(self, n: usize) -> Self {
        match self.source {
            Source::Memory(mut items) => {
                items.truncate(n);
                let mut meta = self.meta;
                meta.count = Some(items.len());
                Self::from_parts(Source::Memory(items), meta)
            }
            Source::Lazy(iter) => {
                let mut meta = self.meta;
                meta.count = meta.count.map(|c| c.min(n));
                meta.estimated = meta.estimated.map(|c| c.min(n));
                Self::lazy(Box::new(iter.take(n)), meta)
            }
        }
    }

    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        let (iter, mut meta) = self.into_parts();
        meta.count = meta.count.map(|c| c.saturating_sub(n));
        meta.estimated = meta.estimated.map(|c| c.saturating_sub(n));
        Self::lazy(Box::new(iter.skip(n)), meta)
    }

    /// Attach the zero-based position to every item: rows get it prepended, records and
    /// struct-rows get an `_n` field first, lines become `Row[n, line]`.
    #[must_use]
    pub fn enumerate(self) -> Self {
        let (iter, mut meta) = self.into_parts();
        let schema = match (&meta.item_type, &meta.schema) {
            (ItemType::StructRow, Some(s)) => Some(Arc::new(enumerated_schema(s))),
            _ => None,
        };
        if let Some(s) = &schema {
            meta.schema = Some(Arc::clone(s));
        }
        if meta.item_type == ItemType::Line {
            meta.item_type = ItemType::Row;
        }
        let out = iter.enumerate().map(move |(n, r)| {
            let item = r?;
            let n = Value::from(n);
            Ok(match item {
                Item::Line(s) => Item::Row(vec![n, Value::Str(s)]),
                Item::Row(mut v) => {
                    v.insert(0, n);
                    Item::Row(v)
                }
                Item::Record(r) => {
                    let mut out = crate::item::Record::with_capacity(r.len() + 1);
                    out.insert(String::from("_n"), n);
                    out.extend(r);
                    Item::Record(out)
                }
                Item::StructRow(s) => {
                    let schema = match &schema {
                        Some(cached) if cached.len() == s.schema().len() + 1 => Arc::clone(cached),
                        _ => Arc::new(enumerated_schema(s.schema())),
                    };
                    let mut values = s.into_values();
                    values.insert(0, n);
                    Item::StructRow(StructRow::from_parts(values, schema))
                }
            })
        });
        Self::lazy(Box::new(out), meta)
    }

    /// Items of `self` followed by the items of `other`.
    #[must_use]
    pub fn chain(self, other: Self) -> Self {
        let (left, mut meta) = self.into_parts();
        let (right, other_meta) = other.into_parts();
        if meta.item_type != other_meta.item_type {
            meta.item_type = ItemType::Any;
        }
        meta.count = meta.count.zip(other_meta.count).map(|(a, b)| a + b);
        meta.estimated = meta
            .estimated
            .zip(other_meta.estimated.or(other_meta.count))
            .map(|(a, b)| a + b);
        meta.absorb(other_meta);
        Self::lazy(Box::new(left.chain(right)), meta)
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    /// Re-encode every item as `target`, using the stream schema for names and field order.
    #[must_use]
    pub fn convert_to(self, target: ItemType) -> Self {
        let (iter, mut meta) = self.into_parts();
        if target == ItemType::Any {
            return Self::lazy(iter, meta);
        }
        let schema = meta.schema.clone();
        let delimiter = meta.config.delimiter;
        meta.item_type = target;
        let out = iter.map(move |r| r?.convert(target, schema.as_ref(), delimiter));
        Self::lazy(Box::new(out), meta)
    }

    #[must_use]
    pub fn to_lines(self) -> Self {
        self.convert_to(ItemType::Line)
    }

    #[must_use]
    pub fn to_rows(self) -> Self {
        self.convert_to(ItemType::Row)
    }

    #[must_use]
    pub fn to_records(self) -> Self {
        self.convert_to(ItemType::Record)
    }

    /// Struct-rows with `schema`, or with the stream schema when `None`.
    ///
    /// # Errors
    /// `InvalidArgument` when no schema is available.
    pub fn to_struct_rows(self, schema: Option<Arc<StructSchema>>) -> Result<Self> {
        let stream = match schema {
            Some(s) => self.with_schema(s),
            None if self.meta.schema.is_some() => self,
            None => {
                return Err(StreamError::invalid(
                    "to_struct_rows",
                    "no schema given and the stream has none",
                )
                .into());
            }
        };
        Ok(stream.convert_to(ItemType::StructRow))
    }

    /// Treat the first line as a title row: its names (with types guessed from the names
    /// unless overridden) become the schema, and the remaining lines become struct-rows.
    ///
    /// # Errors
    /// `UnsupportedItemKind` for streams that are not lines; errors of the first line.
    /// Body lines whose value count differs from the title fail with `Validation`.
    pub fn with_title_row(
        mut self,
        overrides: Option<&HashMap<String, ValueType>>,
    ) -> Result<Self> {
        let kind = self.resolve_item_type()?;
        if kind != ItemType::Line && kind != ItemType::Any {
            return Err(StreamError::unsupported(kind, "with_title_row", "expected lines").into());
        }
        let delimiter = self.meta.config.delimiter;
        let (mut iter, meta) = self.into_parts();
        let Some(title) = iter.next().transpose()? else {
            return Ok(Self::from_parts(Source::Memory(Vec::new()), meta).with_item_kind(ItemType::StructRow));
        };
        let Some(text) = title.as_line() else {
            return Err(StreamError::unsupported(title.item_type(), "with_title_row", "expected lines").into());
        };
        let names: Vec<String> = Item::split_line(text, delimiter)?
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        let schema = Arc::new(StructSchema::from_title_row(&names, overrides));
        let mut meta = meta;
        meta.count = meta.count.map(|c| c.saturating_sub(1));
        meta.schema = Some(Arc::clone(&schema));
        meta.item_type = ItemType::StructRow;
        let out = iter.map(move |r| {
            let item = r?;
            let values = match &item {
                Item::Line(l) => Item::split_line(l, delimiter)?,
                other => return Err(StreamError::unsupported(other.item_type(), "with_title_row", "expected lines").into()),
            };
            // coerces each value and rejects lines wider or narrower than the title
            Ok(Item::StructRow(StructRow::new(values, Arc::clone(&schema), true)?))
        });
        Ok(Self::lazy(Box::new(out), meta))
    }

    pub(crate) fn with_item_kind(mut self, item_type: ItemType) -> Self {
        self.meta.item_type = item_type;
        self
    }

    // ------------------------------------------------------------------
    // Terminal
    // ------------------------------------------------------------------

    /// Consume the stream into a vector.
    ///
    /// # Errors
    /// The first item error.
    pub fn collect(self) -> Result<Vec<Item>> {
        match self.source {
            Source::Memory(items) => Ok(items),
            Source::Lazy(iter) => iter.collect(),
        }
    }

    /// Materialize the stream. The count becomes exact.
    ///
    /// # Errors
    /// The first item error.
    pub fn to_memory(self) -> Result<Self> {
        let (iter, mut meta) = self.into_parts();
        let items = iter.collect::<Result<Vec<_>>>()?;
        meta.count = Some(items.len());
        meta.estimated = None;
        Ok(Self::from_parts(Source::Memory(items), meta))
    }

    /// Make the count exact, materializing lazy streams.
    ///
    /// # Errors
    /// The first item error.
    pub fn update_count(self) -> Result<Self> {
        if self.meta.count.is_some() && self.is_in_memory() {
            return Ok(self);
        }
        self.to_memory()
    }

    /// Write every item to `connector`. Returns the number of items written.
    ///
    /// # Errors
    /// Propagates connector and item errors.
    pub fn write_to(self, connector: &mut dyn Connector) -> Result<usize> {
        let name = self.meta.name.clone();
        let n = connector.write_stream(self)?;
        tracing::debug!(stream = %name, target = %connector.describe(), items = n, "stream written");
        Ok(n)
    }

    /// Close the connectors this stream was read from and drop the pending items. Idempotent.
    ///
    /// # Errors
    /// The first connector failing to close; the rest are still closed.
    pub fn close(&mut self) -> Result<()> {
        self.source = Source::Memory(Vec::new());
        let mut first_err = None;
        for origin in &mut self.meta.origins {
            if origin.is_closed() {
                continue;
            }
            if let Err(e) = origin.close()
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl IntoIterator for Stream {
    type Item = Result<Item>;
    type IntoIter = ItemIter;

    fn into_iter(self) -> Self::IntoIter {
        self.source.into_items()
    }
}

fn enumerated_schema(schema: &StructSchema) -> StructSchema {
    let mut fields = Vec::with_capacity(schema.len() + 1);
    fields.push(Field::new("_n", ValueType::Int));
    fields.extend(schema.fields().iter().cloned());
    StructSchema::from(fields)
}

/// Check items against a declared kind as they are produced.
fn enforce_kind(iter: ItemIter, item_type: ItemType, operation: &'static str) -> ItemIter {
    if item_type == ItemType::Any {
        return iter;
    }
    Box::new(iter.map(move |r| {
        let item = r?;
        if item_type.is_valid(&item) {
            Ok(item)
        } else {
            Err(StreamError::unsupported(
                item.item_type(),
                operation,
                format!("stream declared {item_type} items, got {}", item.summary()),
            )
            .into())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;

    #[test]
    fn peek_does_not_consume() -> Result<()> {
        let mut s = Stream::from_iterator(vec![Item::row([1]), Item::row([2])], ItemType::Any);
        assert_eq!(s.resolve_item_type()?, ItemType::Row);
        assert_eq!(s.get_one_item()?, Some(Item::row([1])));
        assert_eq!(s.collect()?.len(), 2);
        Ok(())
    }

    #[test]
    fn declared_kind_is_enforced() {
        let s = Stream::from_iterator(vec![Item::row([1]), Item::line("x")], ItemType::Row);
        assert!(s.collect().is_err());
    }

    #[test]
    fn enumerate_by_kind() -> Result<()> {
        let out = Stream::from_lines(["a", "b"]).enumerate().collect()?;
        assert_eq!(out, vec![Item::row([Value::from(0), Value::from("a")]), Item::row([Value::from(1), Value::from("b")])]);
        let rec = Stream::from_items(vec![Item::record([("x", 5)])]).enumerate().collect()?;
        assert_eq!(rec[0].field_names(), vec!["_n", "x"]);
        Ok(())
    }

    #[test]
    fn counts_follow_shape_operators() -> Result<()> {
        let s = Stream::from_items((0..10).map(|i| Item::row([i])).collect());
        assert_eq!(s.count(), Some(10));
        let s = s.skip(2).take(5);
        assert_eq!(s.count(), Some(5));
        let s = s.flat_map(|i| Ok(vec![i.clone(), i]));
        assert_eq!(s.count(), None);
        assert_eq!(s.estimated_count(), Some(5));
        assert_eq!(s.update_count()?.count(), Some(10));
        Ok(())
    }

    #[test]
    fn title_row_builds_struct_rows() -> Result<()> {
        let rows = Stream::from_lines(["id\tname", "1\tann", "2\tbob"])
            .with_title_row(None)?
            .collect()?;
        assert_eq!(rows.len(), 2);
        let Item::StructRow(first) = &rows[0] else {
            panic!("expected struct rows");
        };
        assert_eq!(first.schema().field_names(), vec!["id", "name"]);
        assert_eq!(rows[1].get_value(&"name".into())?, Value::from("bob"));
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let mut s = Stream::from_connector(Box::new(MemoryConnector::new(["a"])))?;
        s.close()?;
        s.close()?;
        assert!(s.collect()?.is_empty());
        Ok(())
    }
}

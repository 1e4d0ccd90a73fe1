//! Sorting, in memory or through spill files.
//!
//! Keys are compared with the total order of [`Value`], element by element. A stream whose
//! items fit under [`StreamConfig::max_items_in_memory`](crate::config::StreamConfig) is sorted
//! with a stable in-memory sort. Larger streams are cut into chunks of `step` items, each chunk
//! is sorted and written to a spill file, and the runs are merged with a heap. Both paths yield
//! the same order: ties keep their input order.

use super::{ItemIter, Meta, Source, Stream};
use crate::error::{Result, StreamError};
use crate::item::{FieldRef, Item};
use crate::logger::Level;
use crate::schema::StructSchema;
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Function computing a sort or grouping key from an item.
pub type KeyFn = Arc<dyn Fn(&Item) -> Result<Value> + Send + Sync>;

/// One component of a sort, grouping, join or uniq key.
#[derive(Clone)]
pub enum Key {
    Field(FieldRef),
    Func(KeyFn),
}

impl Key {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Item) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    /// Name under which the key is written into grouped output.
    pub(crate) fn output_name(&self, index: usize, schema: Option<&StructSchema>) -> String {
        match self {
            Self::Field(FieldRef::Name(n)) => n.clone(),
            Self::Field(FieldRef::Position(p)) => schema
                .and_then(|s| s.field_at(*p))
                .map_or_else(|| format!("_{p}"), |f| f.name().to_string()),
            Self::Field(FieldRef::Star) | Self::Func(_) => format!("key_{index}"),
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        match self {
            Self::Field(FieldRef::Name(n)) => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(r) => write!(f, "Key({r})"),
            Self::Func(_) => f.write_str("Key(<fn>)"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Field(FieldRef::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Field(FieldRef::from(s))
    }
}

impl From<usize> for Key {
    fn from(p: usize) -> Self {
        Self::Field(FieldRef::Position(p))
    }
}

impl From<FieldRef> for Key {
    fn from(f: FieldRef) -> Self {
        Self::Field(f)
    }
}

/// Extracts the full composite key of an item.
pub(crate) type KeyOf = Arc<dyn Fn(&Item) -> Result<Vec<Value>>>;

pub(crate) fn collect_keys<I>(keys: I) -> Vec<Key>
where
    I: IntoIterator,
    I::Item: Into<Key>,
{
    keys.into_iter().map(Into::into).collect()
}

/// Key extractor for `keys`; an empty key list means the whole item.
pub(crate) fn key_of(keys: &[Key], schema: Option<&Arc<StructSchema>>, operation: &'static str) -> KeyOf {
    let keys = keys.to_vec();
    let schema = schema.cloned();
    Arc::new(move |item: &Item| {
        if keys.is_empty() {
            return Ok(vec![item.to_value()]);
        }
        keys.iter()
            .map(|k| match k {
                Key::Field(FieldRef::Star) => Ok(item.to_value()),
                Key::Field(f) => item.get_value_in(f, schema.as_deref()),
                Key::Func(func) => func(item).map_err(|e| {
                    StreamError::UserFunction {
                        field: String::from("key"),
                        item: item.summary(),
                        operation: operation.to_string(),
                        message: format!("{e:#}"),
                    }
                    .into()
                }),
            })
            .collect()
    })
}

pub(crate) fn compare_keys(a: &[Value], b: &[Value], reverse: bool) -> Ordering {
    let o = a.cmp(b);
    if reverse { o.reverse() } else { o }
}

impl Stream {
    /// Sort by `keys` (the whole item when empty). Ties keep their input order.
    ///
    /// The input is consumed immediately: the returned stream is in memory, or a lazy merge
    /// over spill files when it did not fit.
    ///
    /// # Errors
    /// Key extraction errors, item errors and spill I/O errors.
    pub fn sort<I>(self, keys: I, reverse: bool) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let keys = collect_keys(keys);
        let extract = key_of(&keys, self.meta.schema.as_ref(), "sort");
        self.sort_with(extract, reverse)
    }

    pub(crate) fn sort_with(self, extract: KeyOf, reverse: bool) -> Result<Self> {
        let (mut iter, meta) = self.into_parts();
        let limit = meta.config.max_items_in_memory;
        let known_large = meta.count.or(meta.estimated).is_some_and(|n| n > limit);

        let mut buffer: Vec<(Vec<Value>, Item)> = Vec::new();
        let mut exhausted = true;
        if !known_large || !cfg!(feature = "spilling") {
            for r in iter.by_ref() {
                let item = r?;
                buffer.push((extract(&item)?, item));
                if cfg!(feature = "spilling") && buffer.len() > limit {
                    exhausted = false;
                    break;
                }
            }
        } else {
            exhausted = false;
        }

        if exhausted {
            tracing::debug!(stream = %meta.name, items = buffer.len(), "sorting in memory");
            buffer.sort_by(|a, b| compare_keys(&a.0, &b.0, reverse));
            let items: Vec<Item> = buffer.into_iter().map(|(_, item)| item).collect();
            let mut meta = meta;
            meta.count = Some(items.len());
            return Ok(Self::from_parts(Source::Memory(items), meta));
        }
        external(buffer, iter, extract, reverse, meta)
    }
}

#[cfg(feature = "spilling")]
fn external(
    buffer: Vec<(Vec<Value>, Item)>,
    rest: ItemIter,
    extract: KeyOf,
    reverse: bool,
    meta: Meta,
) -> Result<Stream> {
    use crate::spill::SpillFile;

    let step = meta.config.step.max(1);
    let dir = meta.config.spill_dir.clone();
    tracing::debug!(stream = %meta.name, step, "sorting through spill files");

    let keyed = buffer.into_iter().map(Ok::<_, anyhow::Error>).chain(rest.map(move |r| {
        let item = r?;
        Ok((extract(&item)?, item))
    }));

    let mut runs = Vec::new();
    let mut total = 0;
    let mut chunk: Vec<(Vec<Value>, Item)> = Vec::with_capacity(step);
    let mut flush = |chunk: &mut Vec<(Vec<Value>, Item)>| -> Result<()> {
        chunk.sort_by(|a, b| compare_keys(&a.0, &b.0, reverse));
        runs.push(SpillFile::write(chunk.iter(), dir.as_deref())?);
        chunk.clear();
        Ok(())
    };
    for entry in keyed {
        chunk.push(entry?);
        total += 1;
        if chunk.len() >= step {
            flush(&mut chunk)?;
        }
    }
    if !chunk.is_empty() {
        flush(&mut chunk)?;
    }
    meta.log(&format!("sorted {total} items in {} spill files", runs.len()), Level::Info);

    let mut merge = MergeRuns {
        heap: std::collections::BinaryHeap::with_capacity(runs.len()),
        runs: Vec::with_capacity(runs.len()),
        reverse,
        pending_error: None,
    };
    for (index, run) in runs.into_iter().enumerate() {
        let mut reader = run.into_reader::<(Vec<Value>, Item)>()?;
        if let Some(first) = reader.next() {
            let (key, item) = first?;
            merge.heap.push(std::cmp::Reverse(Head { key, run: index, item, reverse }));
        }
        merge.runs.push(reader);
    }

    let mut meta = meta;
    meta.count = Some(total);
    Ok(Stream::from_parts(Source::Lazy(Box::new(merge)), meta))
}

#[cfg(not(feature = "spilling"))]
fn external(
    buffer: Vec<(Vec<Value>, Item)>,
    rest: ItemIter,
    extract: KeyOf,
    reverse: bool,
    mut meta: Meta,
) -> Result<Stream> {
    let mut buffer = buffer;
    for r in rest {
        let item = r?;
        buffer.push((extract(&item)?, item));
    }
    buffer.sort_by(|a, b| compare_keys(&a.0, &b.0, reverse));
    let items: Vec<Item> = buffer.into_iter().map(|(_, item)| item).collect();
    meta.count = Some(items.len());
    Ok(Stream::from_parts(Source::Memory(items), meta))
}

/// Head of one sorted run. Ordered by key, then by run index so that equal keys come out in
/// input order.
#[cfg(feature = "spilling")]
struct Head {
    key: Vec<Value>,
    run: usize,
    item: Item,
    reverse: bool,
}

#[cfg(feature = "spilling")]
impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.key, &other.key, self.reverse).then(self.run.cmp(&other.run))
    }
}

#[cfg(feature = "spilling")]
impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(feature = "spilling")]
impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

#[cfg(feature = "spilling")]
impl Eq for Head {}

/// K-way merge of sorted runs. `BinaryHeap` is a max-heap, so heads are wrapped in `Reverse`
/// to pop the smallest first.
#[cfg(feature = "spilling")]
struct MergeRuns {
    heap: std::collections::BinaryHeap<std::cmp::Reverse<Head>>,
    runs: Vec<crate::spill::SpillReader<(Vec<Value>, Item)>>,
    reverse: bool,
    pending_error: Option<anyhow::Error>,
}

#[cfg(feature = "spilling")]
impl Iterator for MergeRuns {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            self.heap.clear();
            return Some(Err(e));
        }
        let std::cmp::Reverse(head) = self.heap.pop()?;
        match self.runs[head.run].next() {
            Some(Ok((key, item))) => self.heap.push(std::cmp::Reverse(Head {
                key,
                run: head.run,
                item,
                reverse: self.reverse,
            })),
            Some(Err(e)) => self.pending_error = Some(e),
            None => {}
        }
        Some(Ok(head.item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::item::ItemType;

    fn numbers(values: &[i64]) -> Vec<Item> {
        values.iter().map(|v| Item::row([*v])).collect()
    }

    #[test]
    fn reverse_sort_in_memory() -> Result<()> {
        let out = Stream::from_items(numbers(&[1, 3, 5, 7, 9, 2, 4, 6, 8]))
            .sort([0usize], true)?
            .collect()?;
        assert_eq!(out, numbers(&[9, 8, 7, 6, 5, 4, 3, 2, 1]));
        Ok(())
    }

    #[cfg(feature = "spilling")]
    #[test]
    fn external_sort_matches_in_memory() -> Result<()> {
        let input: Vec<Item> = (0..50)
            .map(|i| Item::row([Value::from((i * 7) % 10), Value::from(i)]))
            .collect();
        let small = StreamConfig::default().with_max_items_in_memory(8).with_step(5);
        let spilled = Stream::from_iterator(input.clone(), ItemType::Row)
            .with_config(small)
            .sort([0usize], false)?;
        assert!(!spilled.is_in_memory());
        assert_eq!(spilled.count(), Some(50));
        let in_memory = Stream::from_items(input).sort([0usize], false)?;
        assert!(in_memory.is_in_memory());
        assert_eq!(spilled.collect()?, in_memory.collect()?);
        Ok(())
    }

    #[test]
    fn function_keys_and_stability() -> Result<()> {
        let items = vec![Item::line("bb"), Item::line("a"), Item::line("cc"), Item::line("d")];
        let out = Stream::from_items(items)
            .sort([Key::func(|i: &Item| Ok(Value::from(i.as_line().map_or(0, str::len))))], false)?
            .collect()?;
        let lines: Vec<_> = out.iter().filter_map(Item::as_line).collect();
        assert_eq!(lines, vec!["a", "d", "bb", "cc"]);
        Ok(())
    }
}

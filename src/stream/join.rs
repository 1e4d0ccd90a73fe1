//! Joins of two streams on equal keys.
//!
//! Two strategies produce the same multiset of output items:
//!
//! - **map-side**: the right stream is loaded into a hash table and the left stream is
//!   streamed against it. Used when the right side fits under `max_items_in_memory` (or when
//!   forced). Output follows the left order; unmatched right items come last.
//! - **sorted merge**: both sides are sorted by the key and walked in lockstep, run by run.
//!   Output follows key order.
//!
//! Every matching pair is emitted once (the cross product of equal-key runs), unmatched items
//! of the preserved side(s) are merged with an all-null counterpart. `Null` keys compare equal
//! to each other, so null keys match.
//!
//! ```no_run
//! use tabstream::{Item, Join, JoinType, Stream};
//!
//! # fn main() -> anyhow::Result<()> {
//! let users = Stream::from_items(vec![Item::record([("id", 1), ("age", 30)])]);
//! let orders = Stream::from_items(vec![Item::record([("id", 1), ("total", 9)])]);
//! let joined = users.join(orders, Join::on(["id"]).how(JoinType::Inner))?.collect()?;
//! assert_eq!(joined.len(), 1);
//! # Ok(())
//! # }
//! ```

use super::sort::{Key, KeyOf, collect_keys, compare_keys, key_of};
use super::{ItemIter, Meta, Source, Stream};
use crate::error::{Result, StreamError};
use crate::item::{Item, ItemType, Record, StructRow, merge_items};
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

/// Which unmatched items survive a join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JoinType {
    #[default]
    Left,
    Right,
    Inner,
    Full,
}

impl JoinType {
    const fn keeps_left(self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    const fn keeps_right(self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }
}

impl FromStr for JoinType {
    type Err = StreamError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "inner" => Ok(Self::Inner),
            "full" | "outer" => Ok(Self::Full),
            other => Err(StreamError::invalid("join", format!("unknown join type {other:?}"))),
        }
    }
}

/// Settings of a join.
#[derive(Clone, Debug)]
pub struct Join {
    keys: Vec<Key>,
    right_keys: Option<Vec<Key>>,
    how: JoinType,
    right_is_uniq: bool,
    allow_map_side: bool,
    force_map_side: bool,
}

impl Join {
    /// Join on `keys`, read from both sides unless [`Join::right_on`] is given.
    pub fn on<I>(keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        Self {
            keys: collect_keys(keys),
            right_keys: None,
            how: JoinType::Left,
            right_is_uniq: false,
            allow_map_side: true,
            force_map_side: false,
        }
    }

    /// Key fields of the right side, when they differ from the left ones.
    #[must_use]
    pub fn right_on<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.right_keys = Some(collect_keys(keys));
        self
    }

    #[must_use]
    pub const fn how(mut self, how: JoinType) -> Self {
        self.how = how;
        self
    }

    /// Promise that right keys are unique; only the first right match is used.
    #[must_use]
    pub const fn right_is_uniq(mut self, uniq: bool) -> Self {
        self.right_is_uniq = uniq;
        self
    }

    #[must_use]
    pub const fn allow_map_side(mut self, allow: bool) -> Self {
        self.allow_map_side = allow;
        self
    }

    /// Load the right side into memory regardless of its size.
    #[must_use]
    pub const fn force_map_side(mut self, force: bool) -> Self {
        self.force_map_side = force;
        self
    }
}

/// What the join iterators share: merge rules and the all-null counterparts.
struct Merger {
    how: JoinType,
    uniq: bool,
    key_names: Vec<String>,
    left_width: usize,
    right_width: usize,
    left_proto: Option<Item>,
    right_proto: Option<Item>,
}

impl Merger {
    fn observe_left(&mut self, item: &Item) {
        if self.left_proto.is_none() {
            self.left_width = self.left_width.max(item.width());
            self.left_proto = Some(item.clone());
        }
    }

    fn observe_right(&mut self, item: &Item) {
        if self.right_proto.is_none() {
            self.right_width = self.right_width.max(item.width());
            self.right_proto = Some(item.clone());
        }
    }

    fn matched(&self, left: &Item, right: &Item) -> Result<Item> {
        merge_items(Some(left), Some(right), &self.key_names, (self.left_width, self.right_width))
    }

    fn left_only(&self, left: &Item) -> Result<Item> {
        match &self.right_proto {
            Some(proto) => self.matched(left, &nulls_like(proto, Some(left))),
            None => merge_items(Some(left), None, &self.key_names, (self.left_width, self.right_width)),
        }
    }

    fn right_only(&self, right: &Item) -> Result<Item> {
        match &self.left_proto {
            Some(proto) => self.matched(&nulls_like(proto, None), right),
            None => merge_items(None, Some(right), &self.key_names, (self.left_width, self.right_width)),
        }
    }

    /// Output for a left run against a right run with the same key.
    fn pairs(&self, lefts: &[Item], rights: &[Item], out: &mut VecDeque<Item>) -> Result<()> {
        let rights = if self.uniq { &rights[..rights.len().min(1)] } else { rights };
        for l in lefts {
            for r in rights {
                out.push_back(self.matched(l, r)?);
            }
        }
        Ok(())
    }
}

/// A counterpart of `proto`'s shape with every value null. For records, fields that `other`
/// already has are left out so the merge does not overwrite them.
fn nulls_like(proto: &Item, other: Option<&Item>) -> Item {
    match proto {
        Item::Line(_) => Item::Row(vec![Value::Null]),
        Item::Row(v) => Item::Row(vec![Value::Null; v.len()]),
        Item::StructRow(s) => Item::StructRow(StructRow::from_parts(
            vec![Value::Null; s.values().len()],
            Arc::clone(s.schema()),
        )),
        Item::Record(r) => {
            let skip = other.map(Item::field_names).unwrap_or_default();
            Item::Record(
                r.keys()
                    .filter(|k| !skip.contains(k))
                    .map(|k| (k.clone(), Value::Null))
                    .collect::<Record>(),
            )
        }
    }
}

impl Stream {
    /// Join `self` (left) with `right`.
    ///
    /// The output kind is the left kind (lines become rows). Struct-row outputs carry the
    /// merged schema; colliding right names get a `_right` suffix.
    ///
    /// # Errors
    /// Item, key and sort errors; merge errors surface while the output is consumed.
    pub fn join(self, right: Self, join: Join) -> Result<Self> {
        let left_key = key_of(&join.keys, self.meta.schema.as_ref(), "join");
        let right_keys = join.right_keys.as_deref().unwrap_or(&join.keys);
        let right_key = key_of(right_keys, right.meta.schema.as_ref(), "join");
        let limit = right.meta.config.max_items_in_memory.min(self.meta.config.max_items_in_memory);

        let mut merger = Merger {
            how: join.how,
            uniq: join.right_is_uniq,
            key_names: join.keys.iter().filter_map(Key::name).map(str::to_string).collect(),
            left_width: self.meta.schema.as_ref().map_or(0, |s| s.len()),
            right_width: right.meta.schema.as_ref().map_or(0, |s| s.len()),
            left_proto: None,
            right_proto: None,
        };

        let right_known = right.meta.count.or(right.meta.estimated);
        let (mut right_iter, right_meta) = right.into_parts();
        let mut buffer = Vec::new();
        let map_side = if join.force_map_side {
            for r in right_iter.by_ref() {
                buffer.push(r?);
            }
            true
        } else if join.allow_map_side && right_known.is_none_or(|n| n <= limit) {
            let mut fits = true;
            for r in right_iter.by_ref() {
                buffer.push(r?);
                if buffer.len() > limit {
                    fits = false;
                    break;
                }
            }
            fits
        } else {
            false
        };

        let schema = match (&self.meta.schema, &right_meta.schema) {
            (Some(l), Some(r)) => Some(Arc::new(l.merged(r))),
            (l, _) => l.clone(),
        };
        let output_type = match self.meta.item_type {
            ItemType::Line => ItemType::Row,
            other => other,
        };

        if map_side {
            tracing::debug!(stream = %self.meta.name, right_items = buffer.len(), "map-side join");
            let mut table: IndexMap<Vec<Value>, Vec<Item>> = IndexMap::new();
            for item in buffer {
                merger.observe_right(&item);
                table.entry(right_key(&item)?).or_default().push(item);
            }
            let (left_iter, meta) = self.into_parts();
            let meta = finish_meta(meta, right_meta, output_type, schema);
            let iter = MapSideJoin {
                left: left_iter,
                extract: left_key,
                table,
                matched: HashSet::new(),
                merger,
                pending: VecDeque::new(),
                left_done: false,
                finished: false,
            };
            return Ok(Self::from_parts(Source::Lazy(Box::new(iter)), meta));
        }

        tracing::debug!(stream = %self.meta.name, "sorted merge join");
        let right_stream = Self::from_parts(
            Source::Lazy(Box::new(buffer.into_iter().map(Ok).chain(right_iter))),
            right_meta,
        );
        let right_sorted = right_stream.sort_with(Arc::clone(&right_key), false)?;
        let left_sorted = self.sort_with(Arc::clone(&left_key), false)?;
        let (left_iter, meta) = left_sorted.into_parts();
        let (right_iter, right_meta) = right_sorted.into_parts();
        let meta = finish_meta(meta, right_meta, output_type, schema);

        let mut left = Side::new(left_iter, left_key);
        let mut right = Side::new(right_iter, right_key);
        left.fill()?;
        right.fill()?;
        if let Some((_, item)) = &left.head {
            merger.observe_left(item);
        }
        if let Some((_, item)) = &right.head {
            merger.observe_right(item);
        }
        let iter = MergeJoin {
            left,
            right,
            merger,
            pending: VecDeque::new(),
            finished: false,
        };
        Ok(Self::from_parts(Source::Lazy(Box::new(iter)), meta))
    }
}

fn finish_meta(
    meta: Meta,
    right: Meta,
    output_type: ItemType,
    schema: Option<Arc<crate::schema::StructSchema>>,
) -> Meta {
    let mut meta = meta.reshaped();
    meta.absorb(right);
    meta.item_type = output_type;
    meta.schema = schema;
    meta
}

struct MapSideJoin {
    left: ItemIter,
    extract: KeyOf,
    table: IndexMap<Vec<Value>, Vec<Item>>,
    matched: HashSet<usize>,
    merger: Merger,
    pending: VecDeque<Item>,
    left_done: bool,
    finished: bool,
}

impl MapSideJoin {
    /// Queue output for the next left item, or the unmatched rights once the left side ends.
    /// Returns `false` when nothing is left to do.
    fn advance(&mut self) -> Result<bool> {
        if self.left_done {
            return Ok(false);
        }
        let Some(left) = self.left.next().transpose()? else {
            self.left_done = true;
            if self.merger.how.keeps_right() {
                for (i, rights) in self.table.values().enumerate() {
                    if self.matched.contains(&i) {
                        continue;
                    }
                    for r in rights {
                        self.pending.push_back(self.merger.right_only(r)?);
                    }
                }
            }
            return Ok(true);
        };
        self.merger.observe_left(&left);
        let key = (self.extract)(&left)?;
        match self.table.get_full(&key) {
            Some((i, _, rights)) => {
                self.matched.insert(i);
                self.merger.pairs(std::slice::from_ref(&left), rights, &mut self.pending)?;
            }
            None if self.merger.how.keeps_left() => {
                self.pending.push_back(self.merger.left_only(&left)?);
            }
            None => {}
        }
        Ok(true)
    }
}

impl Iterator for MapSideJoin {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// One sorted side of a merge join with a one-item lookahead.
struct Side {
    iter: ItemIter,
    extract: KeyOf,
    head: Option<(Vec<Value>, Item)>,
}

impl Side {
    fn new(iter: ItemIter, extract: KeyOf) -> Self {
        Self {
            iter,
            extract,
            head: None,
        }
    }

    fn fill(&mut self) -> Result<()> {
        self.head = match self.iter.next().transpose()? {
            Some(item) => Some(((self.extract)(&item)?, item)),
            None => None,
        };
        Ok(())
    }

    /// Take the head and every following item with the same key.
    fn take_run(&mut self) -> Result<Vec<Item>> {
        let Some((key, first)) = self.head.take() else {
            return Ok(Vec::new());
        };
        let mut run = vec![first];
        loop {
            self.fill()?;
            match self.head.take() {
                Some((k, item)) if k == key => run.push(item),
                other => {
                    self.head = other;
                    return Ok(run);
                }
            }
        }
    }
}

struct MergeJoin {
    left: Side,
    right: Side,
    merger: Merger,
    pending: VecDeque<Item>,
    finished: bool,
}

impl MergeJoin {
    fn advance(&mut self) -> Result<bool> {
        let order = match (&self.left.head, &self.right.head) {
            (None, None) => return Ok(false),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((l, _)), Some((r, _))) => compare_keys(l, r, false),
        };
        match order {
            Ordering::Less => {
                let run = self.left.take_run()?;
                if self.merger.how.keeps_left() {
                    for l in &run {
                        self.pending.push_back(self.merger.left_only(l)?);
                    }
                }
            }
            Ordering::Greater => {
                let run = self.right.take_run()?;
                if self.merger.how.keeps_right() {
                    for r in &run {
                        self.pending.push_back(self.merger.right_only(r)?);
                    }
                }
            }
            Ordering::Equal => {
                let lefts = self.left.take_run()?;
                let rights = self.right.take_run()?;
                self.merger.pairs(&lefts, &rights, &mut self.pending)?;
            }
        }
        Ok(true)
    }
}

impl Iterator for MergeJoin {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

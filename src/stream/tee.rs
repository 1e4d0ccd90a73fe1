//! Splitting one stream into two independent consumers.
//!
//! Both branches read from a shared buffer; items are dropped from it as soon as both
//! branches have passed them, so memory grows only with the distance between the two readers.

use super::{Source, Stream};
use crate::error::{Result, StreamError, stream_error};
use crate::item::Item;
use anyhow::anyhow;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// An item error kept for the branch that has not seen it yet.
#[derive(Clone)]
struct StoredError {
    kind: Option<StreamError>,
    /// Outermost message of the chain.
    outer: String,
    /// The whole chain, used when the error has no typed kind.
    full: String,
}

impl StoredError {
    fn new(err: &anyhow::Error) -> Self {
        Self {
            kind: stream_error(err).cloned(),
            outer: err.to_string(),
            full: format!("{err:#}"),
        }
    }

    fn rebuild(&self) -> anyhow::Error {
        match &self.kind {
            Some(kind) if kind.to_string() == self.outer => kind.clone().into(),
            Some(kind) => anyhow::Error::new(kind.clone()).context(self.outer.clone()),
            None => anyhow!("{}", self.full),
        }
    }
}

enum Slot {
    Item(Item),
    Error(StoredError),
}

struct Shared {
    source: super::ItemIter,
    buffer: VecDeque<Slot>,
    /// Absolute index of `buffer[0]`.
    base: usize,
    /// Next index of each branch; `None` once the branch was dropped.
    positions: [Option<usize>; 2],
    exhausted: bool,
}

impl Shared {
    fn next_for(&mut self, branch: usize) -> Option<Result<Item>> {
        let pos = self.positions[branch]?;
        if pos - self.base == self.buffer.len() {
            if self.exhausted {
                return None;
            }
            let next = self.source.next();
            let Some(next) = next else {
                self.exhausted = true;
                return None;
            };
            if self.positions[1 - branch].is_none() {
                // sole reader: nothing to keep
                self.positions[branch] = Some(pos + 1);
                self.base = pos + 1;
                return Some(next);
            }
            self.buffer.push_back(match next {
                Ok(item) => Slot::Item(item),
                Err(e) => Slot::Error(StoredError::new(&e)),
            });
        }
        let out = match &self.buffer[pos - self.base] {
            Slot::Item(item) => Ok(item.clone()),
            Slot::Error(err) => Err(err.rebuild()),
        };
        self.positions[branch] = Some(pos + 1);
        self.trim();
        Some(out)
    }

    /// Drop the items every live branch has passed.
    fn trim(&mut self) {
        let end = self.base + self.buffer.len();
        let low = self.positions.iter().flatten().min().copied().unwrap_or(end).min(end);
        while self.base < low {
            self.buffer.pop_front();
            self.base += 1;
        }
    }

    fn release(&mut self, branch: usize) {
        self.positions[branch] = None;
        self.trim();
    }
}

struct Branch {
    shared: Rc<RefCell<Shared>>,
    index: usize,
}

impl Iterator for Branch {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.shared.borrow_mut().next_for(self.index)
    }
}

impl Drop for Branch {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.try_borrow_mut() {
            shared.release(self.index);
        }
    }
}

impl Stream {
    /// Two streams yielding the same items. In-memory streams are cloned; lazy ones share a
    /// buffer. The connectors of the input stay with the first branch.
    #[must_use]
    pub fn tee(self) -> (Self, Self) {
        let (iter, meta) = match self.source {
            Source::Memory(items) => {
                let copy = Self::from_parts(Source::Memory(items.clone()), self.meta.twin());
                return (Self::from_parts(Source::Memory(items), self.meta), copy);
            }
            Source::Lazy(iter) => (iter, self.meta),
        };
        let twin = meta.twin();
        let shared = Rc::new(RefCell::new(Shared {
            source: iter,
            buffer: VecDeque::new(),
            base: 0,
            positions: [Some(0), Some(0)],
            exhausted: false,
        }));
        let first = Branch {
            shared: Rc::clone(&shared),
            index: 0,
        };
        let second = Branch { shared, index: 1 };
        (
            Self::from_parts(Source::Lazy(Box::new(first)), meta),
            Self::from_parts(Source::Lazy(Box::new(second)), twin),
        )
    }

    /// Keep `self` usable and return an independent copy of it.
    #[must_use]
    pub fn copy(&mut self) -> Self {
        let taken = std::mem::take(self);
        let (original, copy) = taken.tee();
        *self = original;
        copy
    }
}

//! # Tabstream
//!
//! A library for **lazy, typed tabular streams**. Data flows through a [`Stream`] as one of
//! four item encodings, and operators transform, reorder, group or combine the stream without
//! materializing it unless they have to.
//!
//! ## Key Features
//!
//! - **Four item kinds**: raw text [`Line`](Item::Line)s, positional [`Row`](Item::Row)s,
//!   named [`Record`](Item::Record)s and schema-backed [`StructRow`]s
//! - **Schemas**: [`StructSchema`] with typed, nullable fields, type guessing from title rows
//!   and per-item validation
//! - **Selections**: positional columns, named expressions and wildcards compiled into a plan
//!   that runs expressions in dependency order and detects cycles
//! - **Stream operators**: map, flat_map, filter, select, sort, sorted_group_by, group_by,
//!   join (inner, left, right, full) and uniq
//! - **Bounded memory**: sorts beyond `max_items_in_memory` spill sorted runs to temporary
//!   files and merge them (feature `spilling`)
//! - **Lenient mode**: attach a [`Logger`] to downgrade per-item function failures and
//!   expression cycles to log messages
//!
//! ## Quick Start
//!
//! ```no_run
//! use tabstream::{Column, Item, Key, Selection, Stream};
//!
//! # fn main() -> anyhow::Result<()> {
//! let rows = Stream::from_lines(["b\t2", "a\t1", "c\t3"])
//!     .to_rows()
//!     .sort([Key::from(0)], false)?
//!     .select(Selection::of([Column::from(1usize), Column::from(0usize)]))?
//!     .collect()?;
//! assert_eq!(rows[0], Item::row(["1", "a"]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution
//!
//! Streams are single-pass iterators. Element-wise operators (`map`, `filter`, `select`,
//! conversions) are lazy and never buffer. Buffering operators (`sort`, `group_by`, the
//! merge side of `join`) consume their input when called; they keep it in memory while it
//! fits under [`StreamConfig::max_items_in_memory`] and otherwise go through spill files of
//! [`StreamConfig::step`] items each. Both paths produce identical output.
//!
//! ## Errors
//!
//! Every fallible operation returns [`anyhow::Result`]. Failures of a well-known kind carry a
//! [`StreamError`] at the root of the chain; use [`stream_error`] to inspect it.
//!
//! ## Feature Flags
//!
//! - `spilling` (default) - external sort through temporary files
//! - `io-glob` (default) - [`LinesFileConnector::from_glob`](connector::LinesFileConnector)
//!
//! ## Module Overview
//!
//! - [`item`] - the four item kinds, field references and join merging
//! - [`value`] - dynamic values with a total order and a stable hash
//! - [`schema`] - fields, value types and struct schemas
//! - [`selection`] - the selection engine
//! - [`stream`] - the `Stream` type and its operators
//! - [`connector`] - line sources and sinks
//! - [`validation`] - schema and rule-based validation
//! - [`testing`] - assertions and fixtures for tests

pub mod config;
pub mod connector;
pub mod error;
pub mod item;
pub mod logger;
pub mod schema;
pub mod selection;
#[cfg(feature = "spilling")]
pub mod spill;
pub mod stream;
pub mod testing;
pub mod validation;
pub mod value;

// General re-exports
pub use config::StreamConfig;
pub use connector::{Connector, LinesFileConnector, MemoryConnector};
pub use error::{Result, StreamError, stream_error};
pub use item::{FieldRef, Item, ItemType, Record, StructRow, merge_items};
pub use logger::{Level, Logger, NullLogger, SharedLogger, TracingLogger};
pub use schema::{Field, StructSchema, ValueType};
pub use selection::{Column, Expr, Selection, SelectionPlan};
pub use stream::{Condition, Filter, Grouping, Join, JoinType, Key, Stream};
pub use validation::{ErrorCollector, Validate, ValidationError, ValidationMode};
pub use value::Value;

//! Testing utilities for tabstream users.
//!
//! - **Assertions**: compare stream outputs with expected items, in order or not
//! - **Fixtures**: small ready-made datasets in every item kind
//! - **Recording logger**: capture what lenient operations report
//! - **Mock I/O**: temporary line files for connector tests
//!
//! # Quick Start
//!
//! ```no_run
//! use tabstream::testing::*;
//! use tabstream::{Grouping, Stream};
//!
//! #[test]
//! fn groups_pairs() -> anyhow::Result<()> {
//!     let out = Stream::from_items(pair_rows())
//!         .sorted_group_by(Grouping::by([0usize]))?
//!         .collect()?;
//!     assert_item_count(&out, 3);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod logging;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use logging::*;
pub use mock_io::*;

use crate::config::StreamConfig;

/// A configuration with tiny thresholds, so that every buffering operator takes its
/// out-of-memory path even on a handful of items.
#[must_use]
pub fn spilling_config() -> StreamConfig {
    StreamConfig::default().with_max_items_in_memory(4).with_step(3)
}

//! Assertion functions for stream outputs.

use crate::item::Item;
use crate::stream::Stream;
use crate::value::Value;
use std::fmt::Debug;

/// Assert that two item lists are equal in order and content.
///
/// # Panics
///
/// Panics if the lists differ in length or content.
///
/// # Example
///
/// ```
/// use tabstream::Item;
/// use tabstream::testing::assert_items_equal;
///
/// assert_items_equal(&[Item::row([1])], &[Item::row([1])]);
/// ```
pub fn assert_items_equal(actual: &[Item], expected: &[Item]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Item count mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(
            a, e,
            "Item mismatch at index {i}:\n  Expected: {e}\n  Actual: {a}"
        );
    }
}

/// Assert that two item lists hold the same items, ignoring order.
///
/// Items are compared through their total value order, so duplicates are counted.
///
/// # Panics
///
/// Panics if the lists differ as multisets.
pub fn assert_items_unordered_equal(actual: &[Item], expected: &[Item]) {
    let mut a: Vec<(Value, &Item)> = actual.iter().map(|i| (i.to_value(), i)).collect();
    let mut e: Vec<(Value, &Item)> = expected.iter().map(|i| (i.to_value(), i)).collect();
    a.sort_by(|x, y| x.0.cmp(&y.0));
    e.sort_by(|x, y| x.0.cmp(&y.0));
    let a: Vec<Item> = a.into_iter().map(|(_, i)| i.clone()).collect();
    let e: Vec<Item> = e.into_iter().map(|(_, i)| i.clone()).collect();
    assert_items_equal(&a, &e);
}

/// Collect `stream` and compare it with `expected` in order.
///
/// # Panics
///
/// Panics if the stream fails or its items differ.
pub fn assert_stream_yields(stream: Stream, expected: &[Item]) {
    match stream.collect() {
        Ok(items) => assert_items_equal(&items, expected),
        Err(e) => panic!("Stream failed: {e:#}"),
    }
}

/// Assert that a list has the expected number of items.
///
/// # Panics
///
/// Panics if the size differs.
pub fn assert_item_count<T: Debug>(items: &[T], expected: usize) {
    assert_eq!(
        items.len(),
        expected,
        "Item count mismatch:\n  Expected: {expected}\n  Actual: {}\n  Items: {items:?}",
        items.len()
    );
}

/// Assert that every item satisfies `predicate`.
///
/// # Panics
///
/// Panics on the first item failing the predicate.
pub fn assert_all_items(items: &[Item], predicate: impl Fn(&Item) -> bool) {
    for (i, item) in items.iter().enumerate() {
        assert!(
            predicate(item),
            "Predicate failed for item at index {i}:\n  Item: {item}"
        );
    }
}

/// Assert that a fallible operation failed with the given [`StreamError`](crate::StreamError)
/// kind (see [`StreamError::kind`](crate::StreamError::kind)).
///
/// # Panics
///
/// Panics if `result` is `Ok` or its error has another kind.
pub fn assert_error_kind<T: Debug>(result: crate::Result<T>, kind: &str) {
    match result {
        Ok(v) => panic!("Expected a {kind} error, got Ok({v:?})"),
        Err(e) => {
            let actual = crate::error::stream_error(&e).map(crate::StreamError::kind);
            assert_eq!(actual, Some(kind), "Unexpected error: {e:#}");
        }
    }
}

//! Small datasets in every item kind.

use crate::item::Item;
use crate::schema::{Field, StructSchema, ValueType};
use crate::value::Value;
use std::sync::Arc;

/// Key/value rows with repeated, already sorted keys:
/// `(1, 11) (1, 12) (2, 21) (3, 31) (3, 32) (3, 33)`.
#[must_use]
pub fn pair_rows() -> Vec<Item> {
    [(1, 11), (1, 12), (2, 21), (3, 31), (3, 32), (3, 33)]
        .into_iter()
        .map(|(k, v)| Item::row([k, v]))
        .collect()
}

/// Single-column rows `1 3 5 7 9 2 4 6 8`.
#[must_use]
pub fn unsorted_numbers() -> Vec<Item> {
    [1, 3, 5, 7, 9, 2, 4, 6, 8].into_iter().map(|n| Item::row([n])).collect()
}

/// Schema of [`people_records`]: `id int, name str, age int, city str`.
#[must_use]
pub fn people_schema() -> Arc<StructSchema> {
    Arc::new(StructSchema::from(vec![
        Field::new("id", ValueType::Int),
        Field::new("name", ValueType::Str),
        Field::new("age", ValueType::Int),
        Field::new("city", ValueType::Str),
    ]))
}

const PEOPLE: [(i64, &str, i64, &str); 5] = [
    (1, "ann", 34, "oslo"),
    (2, "bob", 27, "rome"),
    (3, "cid", 45, "oslo"),
    (4, "dan", 19, "lima"),
    (5, "eve", 52, "rome"),
];

/// Five people, two sharing a city.
#[must_use]
pub fn people_records() -> Vec<Item> {
    PEOPLE
        .into_iter()
        .map(|(id, name, age, city)| {
            Item::record([
                ("id", Value::from(id)),
                ("name", Value::from(name)),
                ("age", Value::from(age)),
                ("city", Value::from(city)),
            ])
        })
        .collect()
}

/// Tab-separated lines of [`people_records`], preceded by a title row.
#[must_use]
pub fn people_lines() -> Vec<String> {
    let mut lines = vec![String::from("id\tname\tage\tcity")];
    lines.extend(
        PEOPLE
            .into_iter()
            .map(|(id, name, age, city)| format!("{id}\t{name}\t{age}\t{city}")),
    );
    lines
}

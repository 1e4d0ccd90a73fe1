// tests/validation.rs
use anyhow::Result;
use regex::Regex;
use std::sync::{Arc, Mutex};
use tabstream::testing::*;
use tabstream::validation::{Check, ValidationResult, check_field, combine_validations, validators};
use tabstream::*;

fn adult(item: &Item) -> ValidationResult {
    check_field(item, "age", |field, value| {
        validators::in_range(field, value, &Value::from(21), &Value::from(200))
    })
}

#[test]
fn skip_invalid_drops_silently() -> Result<()> {
    let out = Stream::from_items(people_records())
        .validate(adult, ValidationMode::SkipInvalid, None)
        .collect()?;
    assert_item_count(&out, 4);
    assert_all_items(&out, |i| i.get_value(&FieldRef::from("name")).ok() != Some(Value::from("dan")));
    Ok(())
}

#[test]
fn log_and_continue_collects_errors() -> Result<()> {
    let collector = Arc::new(Mutex::new(ErrorCollector::new()));
    let logger = RecordingLogger::new();
    let out = Stream::from_items(people_records())
        .with_logger(logger.shared())
        .validate(adult, ValidationMode::LogAndContinue, Some(Arc::clone(&collector)))
        .collect()?;
    assert_item_count(&out, 4);

    let collector = collector.lock().expect("collector lock");
    assert_eq!(collector.error_count(), 1);
    assert_eq!(collector.errors()[0].index, 3);
    assert!(collector.to_json()?.contains("age"));
    assert_eq!(logger.at_least(Level::Warn).len(), 1);
    Ok(())
}

#[test]
fn fail_fast_stops_at_first_invalid_item() {
    let result = Stream::from_items(people_records())
        .validate(adult, ValidationMode::FailFast, None)
        .collect();
    assert_error_kind(result, "validation");
}

#[test]
fn schema_validation_of_rows() -> Result<()> {
    let schema = StructSchema::from(vec![
        Field::new("id", ValueType::Int),
        Field::new("name", ValueType::Str),
    ]);
    let rows = vec![
        Item::row([Value::from(1), Value::from("ann")]),
        Item::row([Value::from("two"), Value::from("bob")]),
        Item::row([Value::from(3)]),
    ];
    let collector = Arc::new(Mutex::new(ErrorCollector::new()));
    let out = Stream::from_items(rows)
        .with_schema(schema)
        .validate_schema(ValidationMode::LogAndContinue, Some(Arc::clone(&collector)))?
        .collect()?;
    assert_items_equal(&out, &[Item::row([Value::from(1), Value::from("ann")])]);
    let collector = collector.lock().expect("collector lock");
    assert_eq!(collector.errors().iter().map(|e| e.index).collect::<Vec<_>>(), [1, 2]);
    Ok(())
}

#[test]
fn schema_validation_needs_a_schema() {
    assert_error_kind(
        Stream::from_items(pair_rows())
            .validate_schema(ValidationMode::FailFast, None)
            .map(|_| ()),
        "invalid_argument",
    );
}

#[test]
fn combined_rules() -> Result<()> {
    let short_name = Regex::new("^[a-z]{3}$")?;
    let rule = move |item: &Item| {
        combine_validations(vec![
            adult(item),
            check_field(item, "name", |f, v| validators::matches(f, v, &short_name)),
            check_field(item, "city", validators::not_empty),
        ])
    };
    let out = Stream::from_items(people_records())
        .validate(rule, ValidationMode::SkipInvalid, None)
        .collect()?;
    assert_item_count(&out, 4);
    Ok(())
}

#[test]
fn missing_field_is_a_rule_error() {
    let result = check_field(&Item::record([("a", 1)]), "b", validators::not_null);
    let errors = result.expect_err("missing field");
    assert_eq!(errors[0].check, Check::MissingField);
    assert_eq!(errors[0].field, Some(FieldRef::from("b")));
}

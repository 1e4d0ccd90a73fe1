// tests/selection.rs
use anyhow::{Result, bail};
use tabstream::testing::*;
use tabstream::*;

fn digits(item: &Item) -> Result<Value> {
    match item.as_line() {
        Some(s) => Ok(Value::from(s.len())),
        None => bail!("not a line"),
    }
}

#[test]
fn item_functions_over_lines() -> Result<()> {
    let out = Stream::from_lines(["12", "123", "1234"])
        .select(Selection::of([
            Column::item(digits),
            Column::item(|i: &Item| -> Result<Value> {
                let text = i.as_line().unwrap_or_default();
                Ok(Value::float(text.parse::<f64>()?))
            }),
            Column::item(|i: &Item| -> Result<Value> { Ok(Value::from(i.as_line().unwrap_or_default())) }),
        ]))?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::row([Value::from(2), Value::float(12.0), Value::from("12")]),
            Item::row([Value::from(3), Value::float(123.0), Value::from("123")]),
            Item::row([Value::from(4), Value::float(1234.0), Value::from("1234")]),
        ],
    );
    Ok(())
}

#[test]
fn star_on_lines_keeps_lines() -> Result<()> {
    let s = Stream::from_lines(["a", "b"]).select(Selection::of(["*"]))?;
    assert_eq!(s.item_type(), ItemType::Line);
    assert_items_equal(&s.collect()?, &[Item::line("a"), Item::line("b")]);
    Ok(())
}

#[test]
fn expressions_resolve_in_dependency_order() -> Result<()> {
    let out = Stream::from_items(vec![Item::record([("price", 10), ("qty", 3)])])
        .select(
            Selection::new()
                .expr("with_tax", Expr::func1("total", |v| Ok(Value::from(v.as_i64().unwrap_or(0) * 2))))
                .expr("total", Expr::func2("price", "qty", |p, q| {
                    Ok(Value::from(p.as_i64().unwrap_or(0) * q.as_i64().unwrap_or(0)))
                }))
                .expr("source", Expr::lit("shop")),
        )?
        .collect()?;
    assert_items_equal(
        &out,
        &[Item::record([
            ("with_tax", Value::from(60)),
            ("total", Value::from(30)),
            ("source", Value::from("shop")),
        ])],
    );
    Ok(())
}

#[test]
fn star_with_expressions_extends_records() -> Result<()> {
    let out = Stream::from_items(people_records())
        .select(
            Selection::of(["*", "-city"])
                .expr("adult", Expr::func1("age", |v| Ok(Value::from(v.as_i64().unwrap_or(0) >= 21)))),
        )?
        .collect()?;
    assert_eq!(
        out[3],
        Item::record([
            ("id", Value::from(4)),
            ("name", Value::from("dan")),
            ("age", Value::from(19)),
            ("adult", Value::from(false)),
        ])
    );
    assert_eq!(out[0].get_value(&FieldRef::from("adult"))?, Value::from(true));
    Ok(())
}

#[test]
fn cycles_fail_without_logger() {
    let sel = Selection::new()
        .expr("a", Expr::func1("b", |v| Ok(v.clone())))
        .expr("b", Expr::func1("a", |v| Ok(v.clone())));
    let result = Stream::from_items(vec![Item::record([("a", 1)])]).select(sel);
    assert_error_kind(result.map(|_| ()), "expression_cycle");
}

#[test]
fn cycles_are_logged_with_stream_logger() -> Result<()> {
    let logger = RecordingLogger::new();
    let sel = Selection::new()
        .expr("a", Expr::func1("b", |v| Ok(v.clone())))
        .expr("b", Expr::func1("a", |v| Ok(v.clone())));
    let out = Stream::from_items(vec![Item::record([("a", 1), ("b", 2)])])
        .with_logger(logger.shared())
        .select(sel)?
        .collect()?;
    assert_item_count(&out, 1);
    assert!(!logger.at_least(Level::Warn).is_empty());
    Ok(())
}

#[test]
fn failing_function_without_logger_stops_the_stream() {
    let sel = Selection::new().expr("n", Expr::func1("text", |v| {
        Ok(Value::from(v.as_str().unwrap_or_default().parse::<i64>()?))
    }));
    let s = Stream::from_items(vec![Item::record([("text", "1")]), Item::record([("text", "x")])]);
    assert_error_kind(s.select(sel).and_then(Stream::collect), "user_function");
}

#[test]
fn failing_function_with_logger_yields_null() -> Result<()> {
    let logger = RecordingLogger::new();
    let sel = Selection::new()
        .expr("n", Expr::func1("text", |v| Ok(Value::from(v.as_str().unwrap_or_default().parse::<i64>()?))))
        .with_logger(logger.shared());
    let out = Stream::from_items(vec![Item::record([("text", "1")]), Item::record([("text", "x")])])
        .select(sel)?
        .collect()?;
    assert_items_equal(&out, &[Item::record([("n", 1)]), Item::record([("n", Value::Null)])]);
    assert_eq!(logger.messages().len(), 1);
    Ok(())
}

#[test]
fn positional_columns_on_rows_use_schema_names() -> Result<()> {
    let schema = StructSchema::from_names(&["id", "name"])?;
    let s = Stream::from_items(vec![Item::row([Value::from(1), Value::from("ann")])])
        .with_schema(schema)
        .select(Selection::of(["name", "id"]))?;
    assert_eq!(s.item_type(), ItemType::Row);
    assert_eq!(s.schema().map(|s| s.field_names()), Some(vec![String::from("name"), String::from("id")]));
    assert_items_equal(&s.collect()?, &[Item::row([Value::from("ann"), Value::from(1)])]);
    Ok(())
}

#[test]
fn multiple_targets_from_one_function() -> Result<()> {
    let out = Stream::from_items(vec![Item::record([("full", "ann smith")])])
        .select(Selection::new().column(Column::multiple(["first", "last"], ["full"], |args: &[Value]| {
            let text = args[0].as_str().unwrap_or_default();
            let (a, b) = text.split_once(' ').unwrap_or((text, ""));
            Ok(vec![Value::from(a), Value::from(b)])
        })).to(ItemType::Record))?
        .collect()?;
    assert_items_equal(&out, &[Item::record([("first", "ann"), ("last", "smith")])]);
    Ok(())
}

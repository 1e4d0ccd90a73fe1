// tests/joins.rs
use anyhow::Result;
use tabstream::testing::*;
use tabstream::*;

fn cities() -> Stream {
    Stream::from_items(vec![
        Item::record([("city", "oslo"), ("country", "no")]),
        Item::record([("city", "rome"), ("country", "it")]),
        Item::record([("city", "kyiv"), ("country", "ua")]),
    ])
}

fn names_by_country(items: &[Item]) -> Result<Vec<(Value, Value)>> {
    let mut out = items
        .iter()
        .map(|i| {
            Ok((
                i.get_value_or(&FieldRef::from("name"), Value::Null)?,
                i.get_value_or(&FieldRef::from("country"), Value::Null)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    out.sort();
    Ok(out)
}

#[test]
fn inner_join_records() -> Result<()> {
    let out = Stream::from_items(people_records())
        .join(cities(), Join::on(["city"]).how(JoinType::Inner))?
        .collect()?;
    assert_item_count(&out, 4);
    assert_eq!(
        names_by_country(&out)?,
        vec![
            (Value::from("ann"), Value::from("no")),
            (Value::from("bob"), Value::from("it")),
            (Value::from("cid"), Value::from("no")),
            (Value::from("eve"), Value::from("it")),
        ]
    );
    Ok(())
}

#[test]
fn left_join_pads_missing_right() -> Result<()> {
    let out = Stream::from_items(people_records())
        .join(cities(), Join::on(["city"]))?
        .collect()?;
    assert_item_count(&out, 5);
    let dan = out
        .iter()
        .find(|i| i.get_value(&FieldRef::from("name")).ok() == Some(Value::from("dan")))
        .expect("dan is kept");
    assert_eq!(dan.get_value_or(&FieldRef::from("country"), Value::Null)?, Value::Null);
    Ok(())
}

#[test]
fn right_and_full_joins_keep_unmatched_right() -> Result<()> {
    let right = Stream::from_items(people_records())
        .join(cities(), Join::on(["city"]).how(JoinType::Right))?
        .collect()?;
    assert_item_count(&right, 5);

    let full = Stream::from_items(people_records())
        .join(cities(), Join::on(["city"]).how(JoinType::Full))?
        .collect()?;
    assert_item_count(&full, 6);
    assert!(names_by_country(&full)?.contains(&(Value::Null, Value::from("ua"))));
    Ok(())
}

#[test]
fn join_type_from_str() -> Result<()> {
    for (text, how) in [
        ("inner", JoinType::Inner),
        ("left", JoinType::Left),
        ("right", JoinType::Right),
        ("full", JoinType::Full),
        ("outer", JoinType::Full),
    ] {
        assert_eq!(text.parse::<JoinType>()?, how);
    }
    assert!("cross".parse::<JoinType>().is_err());
    Ok(())
}

#[test]
fn strategies_agree_on_rows() -> Result<()> {
    let left = || Stream::from_items((0..12).map(|n| Item::row([n % 5, n])).collect());
    let right = || Stream::from_items((0..8).map(|n| Item::row([n % 3, 100 + n])).collect());
    for how in [JoinType::Inner, JoinType::Left, JoinType::Right, JoinType::Full] {
        let map_side = left()
            .join(right(), Join::on([0usize]).how(how).force_map_side(true))?
            .collect()?;
        let merge = left()
            .join(right(), Join::on([0usize]).how(how).allow_map_side(false))?
            .collect()?;
        let spilled = left()
            .with_config(spilling_config())
            .join(
                right().with_config(spilling_config()),
                Join::on([0usize]).how(how).allow_map_side(false),
            )?
            .collect()?;
        assert_items_unordered_equal(&map_side, &merge);
        assert_items_unordered_equal(&spilled, &merge);
    }
    Ok(())
}

#[test]
fn different_key_names_on_each_side() -> Result<()> {
    let orders = Stream::from_items(vec![
        Item::record([("order", 1), ("person", 2)]),
        Item::record([("order", 2), ("person", 9)]),
    ]);
    let out = orders
        .join(
            Stream::from_items(people_records()),
            Join::on(["person"]).right_on(["id"]).how(JoinType::Inner),
        )?
        .collect()?;
    assert_item_count(&out, 1);
    assert_eq!(out[0].get_value(&FieldRef::from("name"))?, Value::from("bob"));
    assert_eq!(out[0].get_value(&FieldRef::from("order"))?, Value::from(1));
    Ok(())
}

#[test]
fn merge_join_output_is_key_ordered() -> Result<()> {
    let left = Stream::from_items(vec![Item::row([3, 30]), Item::row([1, 10]), Item::row([2, 20])]);
    let right = Stream::from_items(vec![Item::row([2, 200]), Item::row([1, 100]), Item::row([3, 300])]);
    let out = left
        .join(right, Join::on([0usize]).how(JoinType::Inner).allow_map_side(false))?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::row([1, 10, 1, 100]),
            Item::row([2, 20, 2, 200]),
            Item::row([3, 30, 3, 300]),
        ],
    );
    Ok(())
}

fn letters() -> Stream {
    Stream::from_items(vec![
        Item::row([Value::from(1), Value::from("a")]),
        Item::row([Value::from(1), Value::from("b")]),
        Item::row([Value::from(2), Value::from("c")]),
        Item::row([Value::from(4), Value::from("d")]),
    ])
}

fn scores() -> Stream {
    Stream::from_items(vec![Item::row([1, 10]), Item::row([1, 11]), Item::row([2, 20]), Item::row([3, 30])])
}

#[test]
fn duplicate_right_keys_fan_out() -> Result<()> {
    let map_side = letters()
        .join(scores(), Join::on([0usize]).force_map_side(true))?
        .collect()?;
    // two left rows on key 1 times two right rows, plus key 2, plus the padded key 4
    assert_item_count(&map_side, 6);
    assert_eq!(
        map_side.iter().filter(|i| i.get_value(&FieldRef::Position(0)).ok() == Some(Value::from(1))).count(),
        4
    );

    let merge = letters()
        .join(scores(), Join::on([0usize]).allow_map_side(false))?
        .collect()?;
    assert_items_unordered_equal(&merge, &map_side);

    let inner = letters()
        .join(scores(), Join::on([0usize]).how(JoinType::Inner).allow_map_side(false))?
        .collect()?;
    assert_item_count(&inner, 5);
    Ok(())
}

#[test]
fn unique_right_keeps_one_row_per_left_item() -> Result<()> {
    let map_side = letters()
        .join(scores(), Join::on([0usize]).right_is_uniq(true).force_map_side(true))?
        .collect()?;
    assert_item_count(&map_side, 4);
    assert!(map_side.contains(&Item::row([Value::from(1), Value::from("b"), Value::from(1), Value::from(10)])));
    assert!(!map_side.iter().any(|i| i.get_value(&FieldRef::Position(3)).ok() == Some(Value::from(11))));

    let merge = letters()
        .join(scores(), Join::on([0usize]).right_is_uniq(true).allow_map_side(false))?
        .collect()?;
    assert_items_unordered_equal(&merge, &map_side);
    Ok(())
}

// tests/grouping.rs
use anyhow::Result;
use tabstream::testing::*;
use tabstream::*;

fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Value {
    Value::List(values.into_iter().map(Into::into).collect())
}

#[test]
fn sorted_group_by_folds_value_columns() -> Result<()> {
    let out = Stream::from_items(pair_rows())
        .sorted_group_by(Grouping::by([0usize]))?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::row([Value::from(1), list([11, 12])]),
            Item::row([Value::from(2), list([21])]),
            Item::row([Value::from(3), list([31, 32, 33])]),
        ],
    );
    Ok(())
}

#[test]
fn sorted_groups_iterates_runs() -> Result<()> {
    let groups: Vec<(Vec<Value>, Vec<Item>)> = Stream::from_items(pair_rows())
        .sorted_groups([0usize])
        .collect::<Result<_>>()?;
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[2].0, vec![Value::from(3)]);
    assert_item_count(&groups[2].1, 3);
    Ok(())
}

#[test]
fn unsorted_input_gives_one_group_per_run() -> Result<()> {
    let input = vec![Item::row([1, 1]), Item::row([2, 2]), Item::row([1, 3])];
    let runs = Stream::from_items(input.clone()).sorted_group_by(Grouping::by([0usize]))?.collect()?;
    assert_item_count(&runs, 3);

    let grouped = Stream::from_items(input).group_by(Grouping::by([0usize]))?.collect()?;
    assert_items_equal(
        &grouped,
        &[Item::row([Value::from(1), list([1, 3])]), Item::row([Value::from(2), list([2])])],
    );
    Ok(())
}

#[test]
fn group_by_spilled_matches_in_memory() -> Result<()> {
    let input: Vec<Item> = (0..30).map(|n| Item::row([n % 4, n])).collect();
    let in_memory = Stream::from_items(input.clone()).group_by(Grouping::by([0usize]))?.collect()?;
    let spilled = Stream::from_iterator(input, ItemType::Row)
        .with_config(spilling_config())
        .group_by(Grouping::by([0usize]))?
        .collect()?;
    assert_item_count(&in_memory, 4);
    assert_items_equal(&spilled, &in_memory);
    Ok(())
}

#[test]
fn records_group_into_records() -> Result<()> {
    let out = Stream::from_items(people_records())
        .group_by(Grouping::by(["city"]).values(["name"]))?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::record([("city", Value::from("lima")), ("name", list(["dan"]))]),
            Item::record([("city", Value::from("oslo")), ("name", list(["ann", "cid"]))]),
            Item::record([("city", Value::from("rome")), ("name", list(["bob", "eve"]))]),
        ],
    );
    Ok(())
}

#[test]
fn pairs_carry_whole_items() -> Result<()> {
    let out = Stream::from_items(pair_rows())
        .take(3)
        .sorted_group_by(Grouping::by([0usize]).as_pairs())?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::row([Value::from(1), Value::List(vec![list([1, 11]), list([1, 12])])]),
            Item::row([Value::from(2), Value::List(vec![list([2, 21])])]),
        ],
    );
    Ok(())
}

#[test]
fn pairs_of_selected_values() -> Result<()> {
    let expected = [
        Item::row([Value::from(1), list([11, 12])]),
        Item::row([Value::from(2), list([21])]),
        Item::row([Value::from(3), list([31, 32, 33])]),
    ];
    let grouping = Grouping::by([0usize]).values([1usize]).as_pairs();

    let sorted = Stream::from_items(pair_rows()).sorted_group_by(grouping.clone())?.collect()?;
    assert_items_equal(&sorted, &expected);

    let mut shuffled = pair_rows();
    shuffled.reverse();
    let by_hash = Stream::from_items(pair_rows())
        .group_by(grouping.clone().take_hash())?
        .collect()?;
    assert_items_unordered_equal(&by_hash, &expected);

    let hashed = Stream::from_iterator(shuffled, ItemType::Row)
        .group_by(grouping)?
        .collect()?;
    // group_by sorts by key and keeps input order inside a group
    assert_items_equal(
        &hashed,
        &[
            Item::row([Value::from(1), list([12, 11])]),
            Item::row([Value::from(2), list([21])]),
            Item::row([Value::from(3), list([33, 32, 31])]),
        ],
    );
    Ok(())
}

#[test]
fn pairs_of_lines() -> Result<()> {
    let out = Stream::from_lines(["apple", "avocado", "banana"])
        .sorted_group_by(
            Grouping::by([Key::func(|i: &Item| Ok(Value::from(i.as_line().unwrap_or_default().get(..1).unwrap_or_default())))])
                .as_pairs(),
        )?
        .collect()?;
    assert_items_equal(
        &out,
        &[
            Item::row([Value::from("a"), list(["apple", "avocado"])]),
            Item::row([Value::from("b"), list(["banana"])]),
        ],
    );
    Ok(())
}

#[test]
fn lines_need_pairs() {
    assert_error_kind(
        Stream::from_lines(["a"]).sorted_group_by(Grouping::by(Vec::<Key>::new())).map(|_| ()),
        "unsupported_item_kind",
    );
}

#[test]
fn empty_input_with_pairs_gives_one_empty_group() -> Result<()> {
    let out = Stream::from_iterator(Vec::new(), ItemType::Row)
        .sorted_group_by(Grouping::by(Vec::<Key>::new()).as_pairs())?
        .collect()?;
    assert_items_equal(&out, &[Item::row([Value::Null, Value::List(Vec::new())])]);
    Ok(())
}

#[test]
fn take_hash_groups_by_key_regardless_of_order() -> Result<()> {
    let out = Stream::from_items(people_records())
        .group_by(Grouping::by(["city"]).values(["id"]).take_hash())?
        .collect()?;
    assert_item_count(&out, 3);
    let oslo = out
        .iter()
        .find(|i| i.get_value(&FieldRef::from("city")).ok() == Some(Value::from("oslo")))
        .expect("oslo group");
    assert_eq!(oslo.get_value(&FieldRef::from("id"))?, list([1, 3]));
    Ok(())
}

// tests/sorting.rs
use anyhow::Result;
use tabstream::testing::*;
use tabstream::*;

fn numbers(range: impl Iterator<Item = i64>) -> Vec<Item> {
    range.map(|n| Item::row([n])).collect()
}

#[test]
fn reverse_sort_of_single_column() -> Result<()> {
    let out = Stream::from_items(unsorted_numbers()).sort([0usize], true)?.collect()?;
    assert_items_equal(&out, &numbers((1..=9).rev()));
    Ok(())
}

#[test]
fn sort_by_record_fields() -> Result<()> {
    let out = Stream::from_items(people_records()).sort(["city", "age"], false)?.collect()?;
    let names: Vec<Value> = out
        .iter()
        .map(|i| i.get_value(&FieldRef::from("name")))
        .collect::<Result<_>>()?;
    assert_eq!(names, ["dan", "ann", "cid", "bob", "eve"].map(Value::from));
    Ok(())
}

#[test]
fn sort_is_stable_for_equal_keys() -> Result<()> {
    let input = vec![Item::row([2, 1]), Item::row([1, 2]), Item::row([2, 3]), Item::row([1, 4])];
    let out = Stream::from_items(input).sort([0usize], false)?.collect()?;
    assert_items_equal(
        &out,
        &[Item::row([1, 2]), Item::row([1, 4]), Item::row([2, 1]), Item::row([2, 3])],
    );
    Ok(())
}

#[test]
fn function_keys() -> Result<()> {
    let out = Stream::from_lines(["ccc", "a", "bb"])
        .sort([Key::func(|i: &Item| Ok(Value::from(i.as_line().map_or(0, str::len))))], false)?
        .collect()?;
    assert_items_equal(&out, &[Item::line("a"), Item::line("bb"), Item::line("ccc")]);
    Ok(())
}

#[test]
fn external_sort_matches_in_memory_sort() -> Result<()> {
    let input: Vec<Item> = (0..40).map(|n| Item::row([(n * 17) % 11, n])).collect();
    let in_memory = Stream::from_items(input.clone()).sort([0usize], false)?.collect()?;

    let spilled = Stream::from_iterator(input, ItemType::Row)
        .with_config(spilling_config())
        .sort([0usize], false)?;
    assert_eq!(spilled.count(), Some(40));
    let spilled = spilled.collect()?;
    assert_items_equal(&spilled, &in_memory);
    Ok(())
}

#[test]
fn external_sort_in_reverse() -> Result<()> {
    let out = Stream::from_iterator(unsorted_numbers(), ItemType::Row)
        .with_config(spilling_config())
        .sort([0usize], true)?
        .collect()?;
    assert_items_equal(&out, &numbers((1..=9).rev()));
    Ok(())
}

#[test]
fn estimated_count_chooses_external_path() -> Result<()> {
    let out = Stream::from_iterator(unsorted_numbers(), ItemType::Row)
        .with_config(spilling_config())
        .with_estimated_count(1_000)
        .sort(Vec::<Key>::new(), false)?
        .collect()?;
    assert_items_equal(&out, &numbers(1..=9));
    Ok(())
}

#[test]
fn spill_files_go_to_configured_directory() -> Result<()> {
    let dir = TempDirPath::new()?;
    let out = Stream::from_iterator(unsorted_numbers(), ItemType::Row)
        .with_config(spilling_config().with_spill_dir(dir.path()))
        .sort([0usize], false)?
        .collect()?;
    assert_items_equal(&out, &numbers(1..=9));
    // runs are removed once merged
    assert_eq!(dir.file_count()?, 0);
    Ok(())
}

#[test]
fn key_errors_surface_as_user_function() {
    let key = Key::func(|_: &Item| -> Result<Value> { anyhow::bail!("no key") });
    assert_error_kind(
        Stream::from_items(pair_rows()).sort([key], false).and_then(Stream::collect),
        "user_function",
    );
}

#[test]
fn uniq_adjacent_and_distinct() -> Result<()> {
    let input = vec![Item::row([1]), Item::row([1]), Item::row([2]), Item::row([1])];
    let adjacent = Stream::from_items(input.clone()).uniq(Vec::<Key>::new(), false)?.collect()?;
    assert_items_equal(&adjacent, &[Item::row([1]), Item::row([2]), Item::row([1])]);

    let distinct = Stream::from_iterator(input, ItemType::Row)
        .with_config(spilling_config())
        .uniq(Vec::<Key>::new(), true)?
        .collect()?;
    assert_items_equal(&distinct, &[Item::row([1]), Item::row([2])]);
    Ok(())
}

#[test]
fn uniq_by_field_keeps_first() -> Result<()> {
    let out = Stream::from_items(people_records()).uniq(["city"], true)?.collect()?;
    let ids: Vec<Value> = out
        .iter()
        .map(|i| i.get_value(&FieldRef::from("id")))
        .collect::<Result<_>>()?;
    assert_eq!(ids, [4, 1, 2].map(Value::from));
    Ok(())
}

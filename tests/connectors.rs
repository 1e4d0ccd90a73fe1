// tests/connectors.rs
use anyhow::Result;
use tabstream::testing::*;
use tabstream::*;

#[test]
fn read_tsv_file_with_title_row() -> Result<()> {
    let file = TempLinesFile::new(people_lines())?;
    let out = Stream::from_connector(Box::new(LinesFileConnector::new(file.path())))?
        .with_title_row(None)?
        .select(Selection::of(["name", "city"]))?
        .collect()?;
    assert_item_count(&out, 5);
    assert_eq!(out[2], Item::row(["cid", "oslo"]));
    Ok(())
}

#[test]
fn write_rows_as_lines() -> Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("sorted.tsv");
    let mut sink = LinesFileConnector::new(&path);
    let n = Stream::from_items(unsorted_numbers())
        .sort([0usize], false)?
        .take(3)
        .write_to(&mut sink)?;
    assert_eq!(n, 3);
    assert_eq!(read_lines(&path)?, ["1", "2", "3"]);
    Ok(())
}

#[test]
fn memory_connector_round_trip() -> Result<()> {
    let mut sink = MemoryConnector::new(Vec::<String>::new());
    Stream::from_items(pair_rows()).take(2).write_to(&mut sink)?;
    assert_eq!(sink.lines(), ["1\t11", "1\t12"]);

    let rows = Stream::from_connector(Box::new(sink))?.to_rows().collect()?;
    assert_items_equal(&rows, &[Item::row(["1", "11"]), Item::row(["1", "12"])]);
    Ok(())
}

#[test]
fn close_is_idempotent_and_reaches_derived_streams() -> Result<()> {
    let file = TempLinesFile::new(["a", "b", "c"])?;
    let mut s = Stream::from_connector(Box::new(LinesFileConnector::new(file.path())))?
        .filter_items(|i| i.as_line() != Some("b"));
    s.close()?;
    s.close()?;
    assert_item_count(&s.collect()?, 0);
    Ok(())
}

#[cfg(feature = "io-glob")]
#[test]
fn glob_concatenates_files_in_order() -> Result<()> {
    let dir = TempDirPath::new()?;
    dir.write_lines("part-2.tsv", &["id\tv", "3\tz"])?;
    dir.write_lines("part-1.tsv", &["id\tv", "1\tx", "2\ty"])?;
    let pattern = dir.path().join("part-*.tsv");
    let connector = LinesFileConnector::from_glob(&pattern.to_string_lossy())?.skip_first_line(true);
    assert_eq!(connector.paths().len(), 2);
    let out = Stream::from_connector(Box::new(connector))?.collect()?;
    assert_items_equal(&out, &[Item::line("1\tx"), Item::line("2\ty"), Item::line("3\tz")]);
    Ok(())
}

#[cfg(feature = "io-glob")]
#[test]
fn glob_without_matches_fails() -> Result<()> {
    let dir = TempDirPath::new()?;
    let pattern = dir.path().join("*.tsv");
    assert!(LinesFileConnector::from_glob(&pattern.to_string_lossy()).is_err());
    Ok(())
}

#[test]
fn missing_file_fails_on_read() -> Result<()> {
    let dir = TempDirPath::new()?;
    let s = Stream::from_connector(Box::new(LinesFileConnector::new(dir.file_path("none.tsv"))))?;
    assert!(s.collect().is_err());
    Ok(())
}

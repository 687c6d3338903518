use anyhow::Result;
use newsflow::io::read_range_bytes;
use newsflow::testing::NewsFixture;
use newsflow::{Schema, plan_chunks, read_chunk};
use std::fs;

#[test]
fn ranges_partition_the_file_on_line_boundaries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(40).write_to(dir.path().join("news.csv"))?;
    let bytes = fs::read(&input)?;

    for n in [1, 2, 3, 7, 16, 64] {
        let ranges = plan_chunks(&input, n)?;
        assert_eq!(ranges.len(), n);
        assert_eq!(ranges[0].start, 0);
        let mut next = 0u64;
        for r in &ranges {
            assert_eq!(r.start, next, "gap or overlap before range {}", r.index);
            next = r.end();
            if r.start > 0 && !r.is_empty() {
                assert_eq!(bytes[r.start as usize - 1], b'\n', "range {} splits a row", r.index);
            }
        }
        assert_eq!(next, bytes.len() as u64);
    }
    Ok(())
}

#[test]
fn raw_reads_reassemble_the_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(25).write_to(dir.path().join("news.csv"))?;
    let mut joined = Vec::new();
    for r in plan_chunks(&input, 5)? {
        joined.extend(read_range_bytes(&input, &r)?);
    }
    assert_eq!(joined, fs::read(&input)?);
    Ok(())
}

#[test]
fn more_chunks_than_rows_loses_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("tiny.csv");
    fs::write(&input, "IDLink,Platform,TimeSlice,Popularity\n1,Facebook,TS1,3\n2,LinkedIn,TS1,4\n")?;
    let schema = Schema::from_file(&input, b',')?;

    let mut ids = Vec::new();
    let mut empty = 0;
    for r in plan_chunks(&input, 12)? {
        let chunk = read_chunk(&input, &r, &schema, Some(&["IDLink"][..]), b',')?;
        if chunk.is_empty() {
            empty += 1;
        }
        ids.extend(chunk.rows().iter().map(|row| row[0].to_string()));
    }
    assert_eq!(ids, ["1", "2"]);
    assert!(empty >= 10);
    Ok(())
}

#[test]
fn chunked_rows_match_a_single_read() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(30).write_to(dir.path().join("news.csv"))?;
    let schema = Schema::from_file(&input, b',')?;

    let whole = read_chunk(&input, &plan_chunks(&input, 1)?[0], &schema, None, b',')?;
    let mut rows = Vec::new();
    let mut offsets = Vec::new();
    for r in plan_chunks(&input, 9)? {
        let c = read_chunk(&input, &r, &schema, None, b',')?;
        rows.extend(c.rows().iter().cloned());
        offsets.extend_from_slice(c.offsets());
    }
    assert_eq!(rows, whole.rows());
    assert_eq!(offsets, whole.offsets());
    Ok(())
}

#[test]
fn zero_chunks_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(2).write_to(dir.path().join("news.csv"))?;
    assert!(plan_chunks(&input, 0).is_err());
    assert!(plan_chunks(dir.path().join("missing.csv"), 2).is_err());
    Ok(())
}

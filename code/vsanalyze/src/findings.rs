// The findings file: one line per paired RMW operation, most recent (or slowest) first.
//
// By default only operations caused by unaligned writes are listed; --all-rmw lists them all.
// The format is fixed, since other tools grep this file:
//
//   Op ID | Length | Object UUID | Start Time | End Time | Total Latency
//   1a2b3c |   4097 | 5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | 2019-05-06T10:00:00.000100 | 2019-05-06T10:00:00.001008 |                    908us

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use vsanlog::{is_unaligned, RmwIoRecord};
use vsanutils::{format_latency, format_trace_timestamp};

pub const DEFAULT_FINDINGS_FILE: &str = "results-vsan-unaligned-ios.txt";

const HEADER: &str = "Op ID | Length | Object UUID | Start Time | End Time | Total Latency";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    StartTime,
    Latency,
}

/// Write the findings to `output` and return the number of operations written.

pub fn write_findings(
    output: &mut dyn io::Write,
    records: &[RmwIoRecord],
    order: SortOrder,
    all_rmw: bool,
) -> Result<usize> {
    let mut selected = records
        .iter()
        .filter(|r| all_rmw || is_unaligned(r.length))
        .collect::<Vec<&RmwIoRecord>>();
    match order {
        SortOrder::StartTime => selected.sort_by(|a, b| b.start.cmp(&a.start)),
        SortOrder::Latency => selected.sort_by(|a, b| b.latency.cmp(&a.latency)),
    }

    writeln!(output, "{HEADER}")?;
    for r in &selected {
        writeln!(
            output,
            "{} | {:>6} | {} | {} | {} | {}",
            r.op_id,
            r.length,
            r.object_uuid,
            format_trace_timestamp(r.start),
            format_trace_timestamp(r.end),
            format_latency(r.latency)
        )?;
    }
    Ok(selected.len())
}

pub fn write_findings_file(
    path: &Path,
    records: &[RmwIoRecord],
    order: SortOrder,
    all_rmw: bool,
) -> Result<usize> {
    let file = fs::File::create(path)
        .with_context(|| format!("Creating findings file {}", path.display()))?;
    let mut output = BufWriter::new(file);
    let n = write_findings(&mut output, records, order, all_rmw)?;
    output
        .flush()
        .with_context(|| format!("Writing findings file {}", path.display()))?;
    log::info!("{n} operations written to {}", path.display());
    Ok(n)
}

#[cfg(test)]
fn whitebox_records() -> Vec<RmwIoRecord> {
    let mut sources = vec![];
    for name in [
        "vsantraces--2019-05-06T10h00m00s000.txt",
        "vsantraces--2019-05-06T11h00m00s000.log",
    ] {
        let path = format!("../tests/vsanlog/{name}");
        sources.push(vsanlog::TraceSource {
            name: name.to_string(),
            text: fs::read_to_string(path).unwrap(),
        });
    }
    let (records, _) = vsanlog::TraceScanner::new().unwrap().scan(&sources);
    records
}

#[test]
fn test_findings_by_time() {
    let records = whitebox_records();
    // 1a2b3c, 1a2b3d (aligned), 2b0001, 2b0002
    assert!(records.len() == 4);

    let mut out = Vec::<u8>::new();
    let n = write_findings(&mut out, &records, SortOrder::StartTime, false).unwrap();
    assert!(n == 3);
    let out = String::from_utf8(out).unwrap();
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 4);
    assert!(lines[0] == HEADER);
    assert!(lines[1].starts_with("2b0002 |   1000 | 5f8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | 2019-05-06T11:00:01.000100 |"));
    assert!(lines[2].starts_with("2b0001 |    700 |"));
    assert!(
        lines[3]
            == "1a2b3c |   4097 | 5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | 2019-05-06T10:00:00.000100 | 2019-05-06T10:00:00.001008 |                    908us"
    );
}

#[test]
fn test_findings_by_latency_all_rmw() {
    let records = whitebox_records();
    let mut out = Vec::<u8>::new();
    let n = write_findings(&mut out, &records, SortOrder::Latency, true).unwrap();
    assert!(n == 4);
    let out = String::from_utf8(out).unwrap();
    let ops = out
        .lines()
        .skip(1)
        .map(|l| l.split(" | ").next().unwrap())
        .collect::<Vec<&str>>();
    // 1min 2s 500ms, 5ms, 908us, 300us
    assert!(ops == vec!["1a2b3d", "2b0001", "1a2b3c", "2b0002"]);
    assert!(out.lines().nth(1).unwrap().ends_with("|      1min 2s 500ms 000us"));
}

#[test]
fn test_findings_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_FINDINGS_FILE);
    let n = write_findings_file(&path, &[], SortOrder::StartTime, false).unwrap();
    assert!(n == 0);
    assert!(fs::read_to_string(&path).unwrap() == format!("{HEADER}\n"));
}

/// Correlation of read-modify-write operations in vSAN traces.
///
/// An RMW operation is announced by a *creation* line, which carries the op id and the length of
/// the write that triggered it:
///
///   [1a2b3c p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {..., 'length-01': 4097}
///
/// and is later followed by timestamped *event* lines for the same op id, one when the request is
/// sent to the server and one when the send has completed.  The event lines also name the object:
///
///   2019-05-06T10:11:12.000100 ... [1a2b3c ... writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5c8a...'}
///
/// Scanning is done in two passes over all the sources: the first collects the op ids from the
/// creation lines, the second picks up the event lines whose op id was collected.  Events can
/// precede their creation line in file order (the traces are not ordered across files), which is
/// why the passes are separate.
///
/// NOTE:
///
/// - The first creation line for an op id wins; later ones are counted and ignored.
///
/// - A later event line of the same stage for the same op id replaces the earlier one.
///
/// - An operation that lacks either timestamp at the end of the scan is dropped, as is one whose
///   completion precedes its start.  Truncated traces will therefore lose operations at both ends,
///   this is expected.

use anyhow::Result;
use chrono::Duration;
use regex::Regex;
use std::collections::HashMap;
use ustr::Ustr;
use vsanutils::{parse_trace_timestamp, Timestamp, UUID_PATTERN};

/// A paired RMW operation.

#[derive(Debug, Clone)]
pub struct RmwIoRecord {
    pub op_id: Ustr,
    pub length: u64,
    pub object_uuid: Ustr,
    pub start: Timestamp,
    pub end: Timestamp,

    /// end - start, never negative.
    pub latency: Duration,
}

/// The text of one trace file.  `name` is used for messages only.

#[derive(Debug, Clone)]
pub struct TraceSource {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Distinct op ids with a creation line.
    pub created: usize,

    /// Creation lines for op ids that had already been seen.
    pub duplicates: usize,

    /// Operations with both timestamps, start <= end.
    pub paired: usize,

    /// Operations dropped for lacking a timestamp or for ending before they started.
    pub pruned: usize,
}

// An operation during the scan.  The object is known only once an event line has been seen.
struct PendingIo {
    op_id: Ustr,
    length: u64,
    object_uuid: Option<Ustr>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

const STAGE_SEND: &str = "DOMTraceOperationSendRequestToServer";
const STAGE_COMPLETED: &str = "DOMTraceOperationSendRequestToServerCompleted";

// Both patterns require this, it's a cheap filter.
const WRITE_MARKER: &str = "writeWithBlkAttr5";

pub struct TraceScanner {
    creation: Regex,
    event: Regex,
}

impl TraceScanner {
    pub fn new() -> Result<TraceScanner> {
        Ok(TraceScanner {
            creation: Regex::new(
                r"\[(?P<op_id>[0-9a-z]+) p:[A-Z]+ p:writeWithBlkAttr5 c:[A-Z]+ c:readModifyWrite.+length-[0-9]{2}.: (?P<length>[0-9]+)\}",
            )?,
            // The op id is the one in the bracket that names the write, there may be other
            // bracketed fields before it.  It is looked up after the match.
            event: Regex::new(&format!(
                r"(?P<date>[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}})T(?P<time>[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}\.[0-9]{{6}}).+?\[(?P<op_id>[0-9a-z]+) [^\]]*writeWithBlkAttr5[^\]]*\].*?(?P<stage>{STAGE_COMPLETED}|{STAGE_SEND}):.+objUuid.: .(?P<object>{UUID_PATTERN})"
            ))?,
        })
    }

    /// Scan the sources and return the paired operations in order of their creation lines, along
    /// with statistics about the scan.

    pub fn scan(&self, sources: &[TraceSource]) -> (Vec<RmwIoRecord>, ScanStats) {
        let mut stats = ScanStats::default();
        let mut pending = Vec::<PendingIo>::new();
        let mut index = HashMap::<Ustr, usize>::new();

        for source in sources {
            let before = pending.len();
            for line in source.text.lines() {
                if !line.contains(WRITE_MARKER) {
                    continue;
                }
                if let Some(io) = self.creation_line(line) {
                    if index.contains_key(&io.op_id) {
                        stats.duplicates += 1;
                    } else {
                        index.insert(io.op_id, pending.len());
                        pending.push(io);
                    }
                }
            }
            log::debug!("{}: {} new RMW operations", source.name, pending.len() - before);
        }
        stats.created = pending.len();

        if !pending.is_empty() {
            for source in sources {
                for line in source.text.lines() {
                    if line.contains(WRITE_MARKER) {
                        self.event_line(line, &index, &mut pending);
                    }
                }
            }
        }

        let mut records = vec![];
        for io in pending {
            match (io.start, io.end, io.object_uuid) {
                (Some(start), Some(end), Some(object_uuid)) if start <= end => {
                    records.push(RmwIoRecord {
                        op_id: io.op_id,
                        length: io.length,
                        object_uuid,
                        start,
                        end,
                        latency: end - start,
                    });
                }
                _ => {
                    log::trace!("Dropping unpaired RMW operation {}", io.op_id);
                    stats.pruned += 1;
                }
            }
        }
        stats.paired = records.len();

        log::info!(
            "RMW operations: {} created, {} paired, {} pruned, {} duplicate creation lines",
            stats.created,
            stats.paired,
            stats.pruned,
            stats.duplicates
        );
        (records, stats)
    }

    fn creation_line(&self, line: &str) -> Option<PendingIo> {
        let c = self.creation.captures(line)?;
        let length = match c["length"].parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                log::debug!("Bad RMW length in: {line}");
                return None;
            }
        };
        Some(PendingIo {
            op_id: Ustr::from(&c["op_id"]),
            length,
            object_uuid: None,
            start: None,
            end: None,
        })
    }

    fn event_line(&self, line: &str, index: &HashMap<Ustr, usize>, pending: &mut [PendingIo]) {
        let Some(c) = self.event.captures(line) else {
            return;
        };
        let Some(ix) = index.get(&Ustr::from(&c["op_id"])) else {
            return;
        };
        let t = match parse_trace_timestamp(&c["date"], &c["time"]) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("{e}");
                return;
            }
        };
        let io = &mut pending[*ix];
        if &c["stage"] == STAGE_COMPLETED {
            io.end = Some(t);
        } else {
            io.start = Some(t);
        }
        io.object_uuid = Some(Ustr::from(&c["object"]));
    }
}

#[cfg(test)]
fn source(name: &str, text: &str) -> TraceSource {
    TraceSource {
        name: name.to_string(),
        text: text.to_string(),
    }
}

#[cfg(test)]
fn whitebox_source(name: &str) -> TraceSource {
    let path = format!("../tests/vsanlog/{name}");
    source(name, &std::fs::read_to_string(path).unwrap())
}

#[test]
fn test_scan_whitebox() {
    let s = TraceScanner::new().unwrap();
    let (records, stats) = s.scan(&[whitebox_source("vsantraces--2019-05-06T10h00m00s000.txt")]);

    // Four creations: one complete and unaligned, one complete and aligned, one that never
    // completes and one that never starts.
    assert!(stats.created == 4);
    assert!(stats.paired == 2);
    assert!(stats.pruned == 2);
    assert!(records.len() == 2);

    let r = &records[0];
    assert!(r.op_id == "1a2b3c");
    assert!(r.length == 4097);
    assert!(r.object_uuid == "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c");
    assert!(r.latency == Duration::microseconds(908));

    let r = &records[1];
    assert!(r.op_id == "1a2b3d");
    assert!(r.length == 8192);
    assert!(r.latency == Duration::minutes(1) + Duration::seconds(2) + Duration::milliseconds(500));
}

#[test]
fn test_start_only_is_pruned() {
    let s = TraceScanner::new().unwrap();
    let text = "\
2019-05-06T10:00:00.000001 cpu1:1001 [ff01 p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {'offset': 0, 'length-01': 100}
2019-05-06T10:00:00.000010 cpu1:1001 [ff01 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'offset': 0}
";
    let (records, stats) = s.scan(&[source("a.txt", text)]);
    assert!(records.is_empty());
    assert!(stats.created == 1);
    assert!(stats.pruned == 1);
}

#[test]
fn test_end_before_start_is_pruned() {
    let s = TraceScanner::new().unwrap();
    let text = "\
2019-05-06T10:00:00.000001 cpu1:1001 [ff02 p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {'offset': 0, 'length-01': 100}
2019-05-06T10:00:00.000500 cpu1:1001 [ff02 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'offset': 0}
2019-05-06T10:00:00.000100 cpu1:1001 [ff02 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServerCompleted: {'objUuid': '5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'status': 0}
";
    let (records, stats) = s.scan(&[source("a.txt", text)]);
    assert!(records.is_empty());
    assert!(stats.pruned == 1);
}

#[test]
fn test_events_in_other_file_and_before_creation() {
    // The events are in the first file and the creation line in the second; also a second
    // creation line for the same op id that must not replace the first.
    let s = TraceScanner::new().unwrap();
    let events = "\
2019-05-06T10:00:01.000000 cpu2:1002 [ab12 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'offset': 4096}
2019-05-06T10:00:01.250000 cpu2:1002 [ab12 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServerCompleted: {'objUuid': '5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'status': 0}
";
    let creations = "\
2019-05-06T10:00:00.900000 cpu2:1002 [ab12 p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {'offset': 4096, 'length-01': 1000}
2019-05-06T10:00:00.950000 cpu2:1002 [ab12 p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {'offset': 4096, 'length-01': 2000}
";
    let (records, stats) = s.scan(&[source("a.txt", events), source("b.txt", creations)]);
    assert!(stats.duplicates == 1);
    assert!(records.len() == 1);
    assert!(records[0].length == 1000);
    assert!(records[0].object_uuid == "5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c");
    assert!(records[0].latency == Duration::milliseconds(250));
}

#[test]
fn test_leading_bracketed_fields() {
    let s = TraceScanner::new().unwrap();
    let text = "\
2019-05-06T10:00:00.000001 [35412591] [cpu40] [ab12 p:DOM p:writeWithBlkAttr5 c:DOM c:readModifyWrite] {'offset': 0, 'length-01': 100}
2019-05-06T10:00:00.000010 [35412592] [cpu40] [ab12 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'offset': 0}
2019-05-06T10:00:00.000090 [35412593 x] [cpu41] [ab12 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServerCompleted: {'objUuid': '5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'status': 0}
";
    let (records, stats) = s.scan(&[source("a.txt", text)]);
    assert!(stats.created == 1);
    assert!(stats.paired == 1);
    assert!(stats.pruned == 0);
    assert!(records[0].op_id == "ab12");
    assert!(records[0].latency == Duration::microseconds(80));
}

#[test]
fn test_unrelated_lines() {
    let s = TraceScanner::new().unwrap();
    let text = "\
2019-05-06T10:00:01.000000 cpu2:1002 [cd34 p:DOM p:writeWithBlkAttr5] DOMTraceOperationSendRequestToServer: {'objUuid': '5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c', 'offset': 4096}
2019-05-06T10:00:01.000000 cpu2:1002 [cd35 p:DOM p:readWithBlkAttr5 c:DOM c:readModifyWrite] {'length-01': 1000}
random noise
";
    let (records, stats) = s.scan(&[source("a.txt", text)]);
    assert!(records.is_empty());
    assert!(stats == ScanStats::default());
}

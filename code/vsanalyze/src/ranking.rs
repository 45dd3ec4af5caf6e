// The objects with the most unaligned writes, and the names of the VMs they belong to.
//
// Only unaligned RMW operations are counted.  Objects are ranked by decreasing count; objects with
// equal counts keep the order in which their first unaligned operation was seen.  An object that is
// not in the CMMDS dump is named "Not in CMMDS", and one whose group has no name, or an empty name,
// is "Not found".
//
// With --affected, only objects that are in the dump and have a component that is not Active are
// ranked.

use crate::format;
use crate::RankingPrintArgs;

use anyhow::Result;
use itertools::Itertools;
use std::collections::HashMap;
use std::io;
use ustr::Ustr;
use vsanlog::{is_unaligned, EmptyNamePolicy, RmwIoRecord, Topology};

pub const NOT_IN_CMMDS: &str = "Not in CMMDS";

struct Ranked {
    count: usize,
    object: Ustr,
    name: String,
}

pub fn print_ranking(
    output: &mut dyn io::Write,
    print_args: &RankingPrintArgs,
    records: &[RmwIoRecord],
    topo: &Topology,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    for w in format::unknown_words(&others) {
        log::warn!("Ignoring unknown --fmt word {w}");
    }
    let opts = format::standard_options(&others);

    let ranked = rank_objects(records, topo, print_args.top_count, print_args.affected);
    format::format_data(output, &fields, &formatters, &opts, &ranked, ())
}

fn rank_objects(
    records: &[RmwIoRecord],
    topo: &Topology,
    top: usize,
    affected_only: bool,
) -> Vec<Ranked> {
    let mut order = vec![];
    let mut counts = HashMap::<Ustr, usize>::new();
    let selected = |r: &&RmwIoRecord| {
        is_unaligned(r.length)
            && (!affected_only || topo.object(&r.object_uuid).is_some_and(|o| o.is_affected()))
    };
    for r in records.iter().filter(selected) {
        let n = counts.entry(r.object_uuid).or_insert(0);
        if *n == 0 {
            order.push(r.object_uuid);
        }
        *n += 1;
    }
    log::info!("{} objects with unaligned writes", order.len());

    order
        .into_iter()
        .map(|object| (object, counts[&object]))
        .sorted_by(|a, b| b.1.cmp(&a.1))
        .take(top)
        .map(|(object, count)| Ranked {
            count,
            object,
            name: match topo.object(&object) {
                Some(obj) => topo.display_name(obj.group_uuid, EmptyNamePolicy::AsNotFound),
                None => NOT_IN_CMMDS.to_string(),
            },
        })
        .collect::<Vec<Ranked>>()
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "count,object,name";

type RankedFormatter = &'static dyn Fn(&Ranked, ()) -> String;

fn my_formatters() -> (HashMap<String, RankedFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, RankedFormatter> = HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();

    formatters.insert("count".to_string(), &format_count);
    formatters.insert("object".to_string(), &format_object);
    formatters.insert("name".to_string(), &format_name);

    (formatters, aliases)
}

fn format_count(d: &Ranked, _: ()) -> String {
    d.count.to_string()
}

fn format_object(d: &Ranked, _: ()) -> String {
    d.object.to_string()
}

fn format_name(d: &Ranked, _: ()) -> String {
    d.name.clone()
}

#[cfg(test)]
use chrono::Duration;
#[cfg(test)]
use vsanutils::parse_trace_timestamp;

#[cfg(test)]
fn synthetic_record(op: usize, object: &str, length: u64) -> RmwIoRecord {
    let start = parse_trace_timestamp("2019-05-06", "10:00:00.000000").unwrap()
        + Duration::milliseconds(op as i64);
    RmwIoRecord {
        op_id: Ustr::from(&format!("{op:x}")),
        length,
        object_uuid: Ustr::from(object),
        start,
        end: start + Duration::microseconds(100),
        latency: Duration::microseconds(100),
    }
}

#[cfg(test)]
fn synthetic_uuid(i: usize) -> String {
    format!("5c8a6a5e-3a4c-2f1b-9e1d-{i:012x}")
}

// 15 objects, object i has i+1 unaligned writes and one aligned write.  Objects 0..14 are in the
// dump, with names vm-<i>, except object 14 which is not in the dump at all and object 13 whose
// name is empty.
#[cfg(test)]
fn synthetic_inputs() -> (Vec<RmwIoRecord>, Topology) {
    let mut records = vec![];
    let mut op = 0;
    for i in 0..15 {
        let uuid = synthetic_uuid(i);
        for _ in 0..=i {
            records.push(synthetic_record(op, &uuid, 512 + op as u64 * 4096));
            op += 1;
        }
        records.push(synthetic_record(op, &uuid, 8192));
        op += 1;
    }

    let mut dump = "[\n".to_string();
    for i in 0..14 {
        let uuid = synthetic_uuid(i);
        dump += &format!(
            r#"{{"type": "DOM_OBJECT", "uuid": "{uuid}", "owner": "", "content": "{{\"attributes\": {{\"groupUuid\": \"{uuid}\"}}}}"}},"#
        );
        dump += "\n";
        let name = if i == 13 { String::new() } else { format!("vm-{i}") };
        dump += &format!(
            r#"{{"type": "DOM_NAME", "uuid": "{uuid}", "owner": "", "content": "{{\"ufn\": \"{name}\", \"cid\": \"{uuid}\"}}"}},"#
        );
        dump += "\n";
    }
    let records_dump = vsanlog::parse_dump(&vsanlog::repair_dump(&dump).unwrap()).unwrap();
    (records, Topology::from_records(records_dump).unwrap())
}

#[test]
fn test_rank_top_ten() {
    let (records, topo) = synthetic_inputs();
    let ranked = rank_objects(&records, &topo, 10, false);
    assert!(ranked.len() == 10);
    for (k, r) in ranked.iter().enumerate() {
        let i = 14 - k;
        assert!(r.count == i + 1);
        assert!(r.object == synthetic_uuid(i).as_str());
        let expected = match i {
            14 => NOT_IN_CMMDS.to_string(),
            13 => vsanlog::NOT_FOUND.to_string(),
            _ => format!("vm-{i}"),
        };
        assert!(r.name == expected);
    }

    // None of the objects have components, so none are affected
    assert!(rank_objects(&records, &topo, 10, true).is_empty());
}

#[test]
fn test_rank_ties_keep_discovery_order() {
    let records = vec![
        synthetic_record(0, &synthetic_uuid(3), 100),
        synthetic_record(1, &synthetic_uuid(1), 100),
        synthetic_record(2, &synthetic_uuid(2), 100),
        synthetic_record(3, &synthetic_uuid(2), 100),
        synthetic_record(4, &synthetic_uuid(1), 4096),
    ];
    let ranked = rank_objects(&records, &Topology::new(), 10, false);
    let objects = ranked.iter().map(|r| r.object.to_string()).collect::<Vec<String>>();
    assert!(objects == vec![synthetic_uuid(2), synthetic_uuid(3), synthetic_uuid(1)]);
    assert!(ranked.iter().all(|r| r.name == NOT_IN_CMMDS));
}

#[test]
fn test_print_ranking() {
    let (records, topo) = synthetic_inputs();
    let args = RankingPrintArgs {
        top_count: 3,
        affected: false,
        fmt: None,
    };
    let mut out = Vec::<u8>::new();
    print_ranking(&mut out, &args, &records, &topo).unwrap();
    let out = String::from_utf8(out).unwrap();
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 5);
    assert!(lines[0].starts_with(" count | object"));
    assert!(lines[2] == format!("    15 | {} | {}", synthetic_uuid(14), NOT_IN_CMMDS));
    assert!(lines[4] == format!("    13 | {} | vm-12", synthetic_uuid(12)));
}

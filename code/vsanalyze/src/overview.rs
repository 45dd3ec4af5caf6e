// Overview of the objects in a CMMDS dump.
//
// There is one row per component.  The first row of an object carries the object columns (UUID,
// class, DOM owner and the friendly name of its group) and the component columns; the following
// rows for the same object carry only the component columns, unless --verbose-rows is given.  In
// the fixed format the objects are separated by rules.
//
// The component column is `<uuid> (<type>): <state>`, with ` Stale` appended if the component has
// a stale CSN.  The device and device host are those of the disk holding the component, and are
// "Not found" if the disk is not in the dump.
//
// With --affected, only objects with at least one component that is not Active are shown.

use crate::format;
use crate::OverviewPrintArgs;

use anyhow::Result;
use std::collections::HashMap;
use std::io;
use vsanlog::{
    resolve_component_state, resolve_object_class, EmptyNamePolicy, StorageObject, Topology,
};

struct Row {
    // Index of the object, for grouping
    group: usize,

    object: String,
    class: String,
    owner: String,
    name: String,

    component: String,
    device: String,
    device_host: String,
}

pub fn print_overview(
    output: &mut dyn io::Write,
    print_args: &OverviewPrintArgs,
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

    let mut rows = vec![];
    let mut shown = 0;
    for (ix, obj) in topo.objects().iter().enumerate() {
        if print_args.affected && !obj.is_affected() {
            continue;
        }
        if obj.components.is_empty() {
            log::debug!("Object {} has no components", obj.uuid);
        }
        shown += 1;
        object_rows(topo, ix, obj, print_args.verbose_rows, &mut rows)?;
    }
    log::info!("{shown} of {} objects shown", topo.objects().len());

    format::format_data(output, &fields, &formatters, &opts, &rows, ())
}

fn object_rows(
    topo: &Topology,
    ix: usize,
    obj: &StorageObject,
    verbose_rows: bool,
    rows: &mut Vec<Row>,
) -> Result<()> {
    let class = resolve_object_class(obj.class_code)?;
    let owner = &topo.host(obj.owner).name;
    let name = topo.display_name(obj.group_uuid, EmptyNamePolicy::Literal);

    for (i, c) in obj.components.iter().enumerate() {
        let mut state = resolve_component_state(c.state)?.to_string();
        if c.stale {
            state += " Stale";
        }
        let disk = topo.disk(c.disk_uuid);
        let (object, class, owner, name) = if i == 0 || verbose_rows {
            (
                obj.uuid.to_string(),
                class.to_string(),
                owner.clone(),
                name.clone(),
            )
        } else {
            (String::new(), String::new(), String::new(), String::new())
        };
        rows.push(Row {
            group: ix,
            object,
            class,
            owner,
            name,
            component: format!("{} ({}): {}", c.uuid, c.kind, state),
            device: disk.device_id.clone(),
            device_host: topo.host(disk.host_uuid).name.clone(),
        });
    }
    Ok(())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters
            .keys()
            .filter(|k| !k.starts_with('*'))
            .cloned()
            .collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "all";

type RowFormatter = &'static dyn Fn(&Row, ()) -> String;

fn my_formatters() -> (HashMap<String, RowFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, RowFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();

    formatters.insert("*group*".to_string(), &format_group);
    formatters.insert("object".to_string(), &format_object);
    formatters.insert("class".to_string(), &format_class);
    formatters.insert("owner".to_string(), &format_owner);
    formatters.insert("component".to_string(), &format_component);
    formatters.insert("device".to_string(), &format_device);
    formatters.insert("devhost".to_string(), &format_device_host);
    formatters.insert("name".to_string(), &format_name);

    aliases.insert(
        "all".to_string(),
        vec![
            "object".to_string(),
            "class".to_string(),
            "owner".to_string(),
            "component".to_string(),
            "device".to_string(),
            "devhost".to_string(),
            "name".to_string(),
        ],
    );

    (formatters, aliases)
}

fn format_group(d: &Row, _: ()) -> String {
    d.group.to_string()
}

fn format_object(d: &Row, _: ()) -> String {
    d.object.clone()
}

fn format_class(d: &Row, _: ()) -> String {
    d.class.clone()
}

fn format_owner(d: &Row, _: ()) -> String {
    d.owner.clone()
}

fn format_component(d: &Row, _: ()) -> String {
    d.component.clone()
}

fn format_device(d: &Row, _: ()) -> String {
    d.device.clone()
}

fn format_device_host(d: &Row, _: ()) -> String {
    d.device_host.clone()
}

fn format_name(d: &Row, _: ()) -> String {
    d.name.clone()
}

#[cfg(test)]
const ONE_OBJECT_DUMP: &str = r#"[
{"type": "HOSTNAME", "uuid": "5c000000-0000-0000-0000-000000000001", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{\"hostname\": \"esx01\"}"},
{"type": "DISK", "uuid": "52000000-0000-0000-0000-0000000000d1", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{\"devName\": \"naa.01:2\"}"},
{"type": "DOM_NAME", "uuid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{\"ufn\": \"vm-01\"}"},
{"type": "DOM_OBJECT", "uuid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{\"attributes\": {\"objClass\": 0, \"groupUuid\": \"5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c\"}, \"child-1\": {\"type\": \"Component\", \"attributes\": {\"componentState\": 5}, \"componentUuid\": \"c1\", \"diskUuid\": \"52000000-0000-0000-0000-0000000000d1\"}, \"child-2\": {\"type\": \"Witness\", \"attributes\": {\"componentState\": 6, \"staleCsn\": 3}, \"componentUuid\": \"c2\", \"diskUuid\": \"52000000-0000-0000-0000-0000000000d1\"}}"},
"#;

#[cfg(test)]
fn render(topo: &Topology, affected: bool, verbose_rows: bool, fmt: Option<&str>) -> String {
    let args = OverviewPrintArgs {
        affected,
        verbose_rows,
        fmt: fmt.map(|s| s.to_string()),
    };
    let mut out = Vec::<u8>::new();
    print_overview(&mut out, &args, topo).unwrap();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
fn one_object_topology() -> Topology {
    let records = vsanlog::parse_dump(&vsanlog::repair_dump(ONE_OBJECT_DUMP).unwrap()).unwrap();
    Topology::from_records(records).unwrap()
}

#[test]
fn test_overview_round_trip() {
    let topo = one_object_topology();
    let out = render(&topo, false, false, Some("all,csv"));
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 2);
    assert!(
        lines[0]
            == "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c,VMDK,esx01,c1 (Component): Active,naa.01:2,esx01,vm-01"
    );
    assert!(lines[1] == ",,,c2 (Witness): Absent Stale,naa.01:2,esx01,");

    // Verbose rows repeat the object columns
    let out = render(&topo, false, true, Some("all,csv"));
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines[1].starts_with("5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c,VMDK,esx01,c2 (Witness)"));
    assert!(lines[1].ends_with(",vm-01"));
}

#[test]
fn test_overview_fixed() {
    let topo = one_object_topology();
    let out = render(&topo, false, false, None);
    let lines = out.lines().collect::<Vec<&str>>();
    // header, rule, two data rows, rule
    assert!(lines.len() == 5);
    assert!(lines[0].starts_with(" object "));
    assert!(lines[1].starts_with("---"));
    assert!(lines[2].starts_with(" 5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | VMDK "));
    assert!(lines[3].trim_start().starts_with("|"));
    assert!(lines[3].contains("| c2 (Witness): Absent Stale"));
    assert!(lines[4] == lines[1]);
}

#[test]
fn test_overview_whitebox_affected() {
    let records = vsanlog::read_dump(std::path::Path::new("../tests/vsanlog/whitebox-cmmds.txt")).unwrap();
    let topo = Topology::from_records(records).unwrap();

    let out = render(&topo, false, false, Some("object,name,csv"));
    assert!(out.lines().count() == 5);

    // Only the second object has a component that is not Active
    let out = render(&topo, true, false, Some("object,class,owner,component,device,name,csv"));
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 2);
    assert!(lines[0].starts_with("5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c,Namespace,Not found,"));
    assert!(lines[0].contains("(Component): Absent Stale,naa.5000c500a1b2c3d4:2,<none>"));
    assert!(lines[1].contains("(Component): Active,Not found,"));
}

#[test]
fn test_overview_bad_state() {
    let dump = ONE_OBJECT_DUMP.replace("\\\"componentState\\\": 6", "\\\"componentState\\\": 13");
    let records = vsanlog::parse_dump(&vsanlog::repair_dump(&dump).unwrap()).unwrap();
    let topo = Topology::from_records(records).unwrap();
    let args = OverviewPrintArgs {
        affected: false,
        verbose_rows: false,
        fmt: None,
    };
    let mut out = Vec::<u8>::new();
    let e = print_overview(&mut out, &args, &topo).unwrap_err();
    assert!(matches!(
        e.downcast_ref::<vsanlog::VsanError>(),
        Some(vsanlog::VsanError::OutOfRange { code: 13, .. })
    ));
}

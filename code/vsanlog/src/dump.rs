/// Reader for CMMDS dumps as written by `cmmds-tool find -f python`.
///
/// The dump is a JSON array of entries, one object per CMMDS entry, with the fields `type`,
/// `uuid`, `owner` and `content` (and others we don't care about).  The tool does not close the
/// array properly: the last entry is followed by a dangling `,`, sometimes followed by a `]` line
/// and sometimes not.  The text is repaired before it goes to the JSON parser, see repair_dump().
///
/// NOTE:
///
/// - Entries of types other than the four we know are skipped silently, there are lots of them.
///
/// - Entries without a usable `type` or `uuid` are dropped and counted, they are most likely
///   the result of a partly written dump.
///
/// - The `content` is normally a string holding a Python-style dict.  If it is a JSON object
///   instead it is rendered back into that same textual shape, so that the extractors see one
///   format only.

use crate::errors::VsanError;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use ustr::Ustr;
use vsanutils::ZERO_UUID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Object,
    Name,
    Host,
    Disk,
}

impl RecordKind {
    /// Map a CMMDS entry type keyword to a kind.  The short forms are accepted too.

    pub fn from_keyword(s: &str) -> Option<RecordKind> {
        match s {
            "DOM_OBJECT" | "OBJECT" => Some(RecordKind::Object),
            "DOM_NAME" | "NAME" => Some(RecordKind::Name),
            "HOSTNAME" | "HOST" => Some(RecordKind::Host),
            "DISK" => Some(RecordKind::Disk),
            _ => None,
        }
    }
}

/// One entry of the dump, before its content has been looked at.

#[derive(Debug, Clone)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub uuid: Ustr,
    pub owner: Ustr,
    pub content: String,
}

/// Read, repair and parse the dump at `path`.  Fails with VsanError::DumpNotFound if there is no
/// such file.

pub fn read_dump(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.is_file() {
        return Err(VsanError::DumpNotFound(path.display().to_string()).into());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Reading CMMDS dump {}", path.display()))?;
    let records = parse_dump(&repair_dump(&text)?)?;
    log::info!("{} relevant entries in CMMDS dump {}", records.len(), path.display());
    Ok(records)
}

/// As read_dump(), but the file is deleted once it has been parsed successfully.  This is for
/// dumps we generated ourselves into a scratch location.

pub fn read_and_remove_dump(path: &Path) -> Result<Vec<RawRecord>> {
    let records = read_dump(path)?;
    fs::remove_file(path)
        .with_context(|| format!("Removing temporary CMMDS dump {}", path.display()))?;
    Ok(records)
}

/// Fix up the tail of the dump so that it is a well-formed JSON array.  The rules, looking only at
/// the last non-blank lines:
///
///  - `...,` then `]`: the trailing comma is removed
///  - `...,` at the end with no `]`: the trailing comma is removed and a `]` line is appended
///  - anything ending in `]` that is not preceded by a comma: already fine, left alone
///
/// Everything else is an error.  No other text is changed, and repairing a repaired dump is a
/// no-op.

pub fn repair_dump(text: &str) -> Result<String> {
    let lines = text.split_inclusive('\n').collect::<Vec<&str>>();
    let mut nonblank = lines
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i);

    let first = lines.iter().find(|l| !l.trim().is_empty());
    if !first.map_or(false, |l| l.trim_start().starts_with('[')) {
        return Err(VsanError::DumpUnrepairable("the dump is not an array".to_string()).into());
    }

    let last = match nonblank.next() {
        Some(i) => i,
        None => return Err(VsanError::DumpUnrepairable("the dump is empty".to_string()).into()),
    };
    let last_text = lines[last].trim();

    if last_text.ends_with(']') {
        let before_bracket = last_text[..last_text.len() - 1].trim_end();
        if !before_bracket.is_empty() {
            // Single-line dump, or the bracket shares a line with the last entry.
            if before_bracket.ends_with(',') {
                let fixed = remove_last_comma(lines[last]);
                return Ok(splice(&lines, last, &fixed));
            }
            return Ok(text.to_string());
        }
        let prev = match nonblank.next() {
            Some(i) => i,
            None => {
                return Err(
                    VsanError::DumpUnrepairable("no opening bracket".to_string()).into(),
                )
            }
        };
        if lines[prev].trim_end().ends_with(',') {
            let fixed = remove_last_comma(lines[prev]);
            return Ok(splice(&lines, prev, &fixed));
        }
        return Ok(text.to_string());
    }

    if last_text.ends_with(',') {
        let mut fixed = remove_last_comma(lines[last]);
        if !fixed.ends_with('\n') {
            fixed.push('\n');
        }
        fixed.push_str("]\n");
        return Ok(splice(&lines, last, &fixed));
    }

    Err(VsanError::DumpUnrepairable(format!(
        "unexpected final line {}",
        last_text.chars().take(40).collect::<String>()
    ))
    .into())
}

// The callers have checked that there is a comma, either last on the line or just before a `]`.
fn remove_last_comma(line: &str) -> String {
    match line.trim_end().rfind(',') {
        Some(comma) => {
            let mut s = line[..comma].to_string();
            s.push_str(&line[comma + 1..]);
            s
        }
        None => line.to_string(),
    }
}

fn splice(lines: &[&str], at: usize, replacement: &str) -> String {
    let mut s = String::new();
    for (i, l) in lines.iter().enumerate() {
        if i == at {
            s.push_str(replacement);
        } else {
            s.push_str(l);
        }
    }
    s
}

/// Parse a repaired dump into raw records of the four kinds we care about, in dump order.
///
/// Since the entries carry many fields we don't want and vary with the vSAN version, I use the
/// generic JSON parser followed by explicit decoding of the few fields, rather than a derived
/// strongly-typed parser.

pub fn parse_dump(text: &str) -> Result<Vec<RawRecord>> {
    let v: Value = serde_json::from_str(text).context("Parsing CMMDS dump")?;
    let entries = match v {
        Value::Array(entries) => entries,
        _ => bail!("CMMDS dump is not a JSON array"),
    };

    let mut records = vec![];
    let mut discarded = 0usize;
    for entry in entries {
        let fields = match entry {
            Value::Object(fields) => fields,
            _ => {
                discarded += 1;
                continue;
            }
        };
        let kind = match fields.get("type") {
            Some(Value::String(t)) => match RecordKind::from_keyword(t) {
                Some(k) => k,
                None => continue,
            },
            _ => {
                discarded += 1;
                continue;
            }
        };
        let uuid = match fields.get("uuid") {
            Some(Value::String(u)) if !u.is_empty() => Ustr::from(u),
            _ => {
                discarded += 1;
                continue;
            }
        };
        let owner = match fields.get("owner") {
            Some(Value::String(o)) if !o.is_empty() => Ustr::from(o),
            _ => Ustr::from(ZERO_UUID),
        };
        let content = match fields.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => render_content(other),
        };
        records.push(RawRecord {
            kind,
            uuid,
            owner,
            content,
        });
    }
    if discarded > 0 {
        log::debug!("Discarded {discarded} malformed CMMDS entries");
    }
    Ok(records)
}

// Render a JSON value the way Python's json.dumps() does by default: `, ` between elements and
// `: ` after keys.  The extractors depend on that spacing.

fn render_content(v: &Value) -> String {
    match v {
        Value::Object(fields) => {
            let parts = fields
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), render_content(v)))
                .collect::<Vec<String>>();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Array(elts) => {
            let parts = elts.iter().map(render_content).collect::<Vec<String>>();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
const TRUNCATED_DUMP: &str = r#"[
{"type": "HOSTNAME", "uuid": "5c000000-0000-0000-0000-000000000001", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{\"hostname\": \"esx01.example.com\"}"},
{"type": "CONFIG_STATUS", "uuid": "5c000000-0000-0000-0000-000000000009", "owner": "5c000000-0000-0000-0000-000000000001", "content": "{}"},
{"type": "DISK", "uuid": "52000000-0000-0000-0000-0000000000d1", "owner": "5c000000-0000-0000-0000-000000000001", "content": {"devName": "naa.5000c500a1b2c3d4:2", "isSsd": 0}},
]
"#;

#[test]
fn test_repair_trailing_comma_before_bracket() {
    let fixed = repair_dump(TRUNCATED_DUMP).unwrap();
    assert!(fixed.ends_with("\"isSsd\": 0}}\n]\n"));
    // Only the one comma went away.
    assert!(fixed.len() == TRUNCATED_DUMP.len() - 1);
    assert!(parse_dump(&fixed).is_ok());
}

#[test]
fn test_repair_missing_bracket() {
    let text = "[\n{\"type\": \"DISK\", \"uuid\": \"a\"},\n{\"type\": \"DISK\", \"uuid\": \"b\"},\n";
    let fixed = repair_dump(text).unwrap();
    assert!(fixed == "[\n{\"type\": \"DISK\", \"uuid\": \"a\"},\n{\"type\": \"DISK\", \"uuid\": \"b\"}\n]\n");
    assert!(parse_dump(&fixed).unwrap().len() == 2);

    // No final newline at all
    let text = "[\n{\"type\": \"DISK\", \"uuid\": \"a\"},";
    let fixed = repair_dump(text).unwrap();
    assert!(fixed == "[\n{\"type\": \"DISK\", \"uuid\": \"a\"}\n]\n");
}

#[test]
fn test_repair_idempotent() {
    let well_formed = "[\n{\"type\": \"DISK\", \"uuid\": \"a\"}\n]\n\n";
    let once = repair_dump(well_formed).unwrap();
    let twice = repair_dump(&once).unwrap();
    assert!(once == well_formed);
    assert!(twice == once);
    assert!(parse_dump(&twice).is_ok());

    let once = repair_dump(TRUNCATED_DUMP).unwrap();
    let twice = repair_dump(&once).unwrap();
    assert!(twice == once);

    let single = r#"[{"type": "DISK", "uuid": "a"}, {"type": "DISK", "uuid": "b"}]"#;
    assert!(repair_dump(single).unwrap() == single);
    let dangling = r#"[{"type": "DISK", "uuid": "a"}, {"type": "DISK", "uuid": "b"},]"#;
    assert!(repair_dump(dangling).unwrap() == single);
    assert!(repair_dump("[]").unwrap() == "[]");
}

#[test]
fn test_repair_rejects_unknown_shapes() {
    for text in ["", "\n\n", "{\"a\": 1}", "[\n{\"type\": \"DISK\"\n", "[\n{\"type\": \"DISK\"}\n"] {
        let e = repair_dump(text).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<VsanError>(),
            Some(VsanError::DumpUnrepairable(_))
        ));
    }
}

#[test]
fn test_parse_dump_kinds_and_content() {
    let records = parse_dump(&repair_dump(TRUNCATED_DUMP).unwrap()).unwrap();
    // CONFIG_STATUS is not one of ours
    assert!(records.len() == 2);
    assert!(records[0].kind == RecordKind::Host);
    assert!(records[0].content == r#"{"hostname": "esx01.example.com"}"#);
    assert!(records[1].kind == RecordKind::Disk);
    assert!(records[1].owner == "5c000000-0000-0000-0000-000000000001");
    // Object content comes back in the textual shape
    assert!(records[1].content == r#"{"devName": "naa.5000c500a1b2c3d4:2", "isSsd": 0}"#);
}

#[test]
fn test_parse_dump_drops_malformed_entries() {
    let text = r#"[{"type": "DISK"}, 17, {"uuid": "x"}, {"type": "DOM_NAME", "uuid": "g"}]"#;
    let records = parse_dump(text).unwrap();
    assert!(records.len() == 1);
    assert!(records[0].kind == RecordKind::Name);
    assert!(records[0].owner == ZERO_UUID);
    assert!(records[0].content.is_empty());
}

#[test]
fn test_read_dump_missing_file() {
    let e = read_dump(Path::new("../tests/vsanlog/no-such-dump.txt")).unwrap_err();
    assert!(matches!(
        e.downcast_ref::<VsanError>(),
        Some(VsanError::DumpNotFound(_))
    ));
}

#[test]
fn test_read_and_remove_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmmds.txt");
    fs::write(&path, TRUNCATED_DUMP).unwrap();
    let records = read_and_remove_dump(&path).unwrap();
    assert!(records.len() == 2);
    assert!(!path.exists());

    // A dump that cannot be parsed is left in place for inspection.
    fs::write(&path, "[\n{\"type\": \n").unwrap();
    assert!(read_and_remove_dump(&path).is_err());
    assert!(path.exists());
}

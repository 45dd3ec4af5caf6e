/// Generic formatting code for a set of data extracted from a data structure to be presented
/// columnar, as csv, as json or for awk, and (except for json and awk) with or without a header
/// and with or without named fields.
///
/// The columnar form separates columns with ` | ` and underlines the header.  Rows can be grouped:
/// if the formatters contain a `*group*` formatter, its value is computed for each row and a
/// separator line is printed after each run of rows with the same value.  Columns in which every
/// value is a number are right-aligned.
use anyhow::{bail, Result};
use csv;
use json;
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    if let Some(ref s) = fmt {
        if s.starts_with("help") {
            let mut help = f();
            println!("Syntax:\n  --fmt=(field|alias|control),...");
            println!("\nFields:");
            help.fields.sort();
            for f in help.fields {
                println!("  {f}");
            }
            if !help.aliases.is_empty() {
                println!("\nAliases:");
                help.aliases.sort();
                for (name, mut fields) in help.aliases {
                    fields.sort();
                    let explication = fields.join(",");
                    println!("  {name} --> {explication}");
                }
            }
            println!("\nDefaults:\n  {}", help.defaults);
            println!("\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  noheader");
            return true;
        }
    }
    false
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, FmtT, CtxT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if x.starts_with('*') {
            others.insert(x);
        } else if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(aliases) = aliases.get(x) {
            for alias in aliases {
                if formatters.contains_key(alias) {
                    fields.push(alias.as_ref());
                } else {
                    others.insert(alias.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv or csvnamed explicitly requested
    pub awk: bool,    // awk explicitly requested
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    // json and awk get no header, even if one is requested
    let header = (!csv && !json && !awk && !others.contains("noheader"))
        || (csv && others.contains("header"));
    FormatOptions {
        csv,
        json,
        awk,
        header,
        named: csvnamed,
    }
}

/// Strings in `others` that are neither control words nor fields.

pub fn unknown_words<'a>(others: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut unknown = others
        .iter()
        .filter(|x| {
            !matches!(
                **x,
                "awk" | "csv" | "csvnamed" | "fixed" | "json" | "header" | "noheader" | ""
            )
        })
        .copied()
        .collect::<Vec<&str>>();
    unknown.sort();
    unknown
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format.

pub fn format_data<'a, DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut fmts = vec![];
    for kwd in fields {
        match formatters.get(*kwd) {
            Some(f) => fmts.push(f),
            None => bail!("Unknown field {kwd}"),
        }
    }
    let mut cols = Vec::<Vec<String>>::new();
    cols.resize(fields.len(), vec![]);
    for x in data {
        for (i, f) in fmts.iter().enumerate() {
            cols[i].push(f(x, ctx));
        }
    }

    if opts.csv {
        format_csv(output, fields, opts, cols)
    } else if opts.json {
        format_json(output, fields, cols)
    } else if opts.awk {
        format_awk(output, fields, cols)
    } else {
        let groups = match formatters.get("*group*") {
            Some(f) => data.iter().map(|x| f(x, ctx)).collect::<Vec<String>>(),
            None => vec![],
        };
        format_fixed_width(output, fields, opts, cols, groups);
        Ok(())
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
    groups: Vec<String>,
) {
    // The column width is the max across all the entries in the column (including header,
    // if present).
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = kwd.len();
        }
    }
    let mut numeric = vec![true; fields.len()];
    for (col, vals) in cols.iter().enumerate() {
        for v in vals {
            widths[col] = usize::max(widths[col], v.len());
            numeric[col] = numeric[col] && !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
        }
        if vals.is_empty() {
            numeric[col] = false;
        }
    }

    let rule = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<String>>()
        .join("+")
        + "\n";

    // Errors are ignored here, they are common for broken pipelines
    if opts.header {
        let _ = output.write_all(render_row(fields, &widths, &numeric).as_bytes());
        let _ = output.write_all(rule.as_bytes());
    }

    let nrows = if cols.is_empty() { 0 } else { cols[0].len() };
    for row in 0..nrows {
        let vals = cols.iter().map(|c| c[row].as_str()).collect::<Vec<&str>>();
        let _ = output.write_all(render_row(&vals, &widths, &numeric).as_bytes());
        if !groups.is_empty() && (row + 1 == nrows || groups[row] != groups[row + 1]) {
            let _ = output.write_all(rule.as_bytes());
        }
    }
}

fn render_row(vals: &[&str], widths: &[usize], numeric: &[bool]) -> String {
    let mut s = "".to_string();
    for (col, v) in vals.iter().enumerate() {
        let w = widths[col];
        s += if col > 0 { "| " } else { " " };
        if numeric[col] {
            s += format!("{:>w$} ", v).as_str();
        } else {
            s += format!("{:w$} ", v).as_str();
        }
    }
    s.trim_end().to_string() + "\n"
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        writer.write_record(fields)?;
    }

    let nrows = if cols.is_empty() { 0 } else { cols[0].len() };
    for row in 0..nrows {
        let mut out_fields = Vec::new();
        for (col, vals) in cols.iter().enumerate() {
            if opts.named {
                out_fields.push(format!("{}={}", fields[col], vals[row]));
            } else {
                out_fields.push(vals[row].clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], cols: Vec<Vec<String>>) -> Result<()> {
    let nrows = if cols.is_empty() { 0 } else { cols[0].len() };
    let mut objects = vec![];
    for row in 0..nrows {
        let mut obj = json::JsonValue::new_object();
        for (col, vals) in cols.iter().enumerate() {
            obj[fields[col]] = vals[row].clone().into();
        }
        objects.push(obj);
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.  Empty fields are printed as `_` so that the columns stay put.

fn format_awk(output: &mut dyn io::Write, fields: &[&str], cols: Vec<Vec<String>>) -> Result<()> {
    let nrows = if cols.is_empty() { 0 } else { cols[0].len() };
    for row in 0..nrows {
        let mut line = "".to_string();
        for col in 0..fields.len() {
            let val = &cols[col][row];
            if !line.is_empty() {
                line += " ";
            }
            if val.is_empty() {
                line += "_";
            } else {
                line += val.replace(' ', "_").as_str();
            }
        }
        line += "\n";
        output.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
struct Pair {
    name: String,
    count: usize,
}

#[cfg(test)]
fn format_name(d: &Pair, _: ()) -> String {
    d.name.clone()
}

#[cfg(test)]
fn format_count(d: &Pair, _: ()) -> String {
    d.count.to_string()
}

#[cfg(test)]
fn test_formatters() -> HashMap<String, &'static dyn Fn(&Pair, ()) -> String> {
    let mut formatters: HashMap<String, &'static dyn Fn(&Pair, ()) -> String> = HashMap::new();
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("count".to_string(), &format_count);
    formatters
}

#[cfg(test)]
fn test_data() -> Vec<Pair> {
    vec![
        Pair {
            name: "vm one".to_string(),
            count: 7,
        },
        Pair {
            name: "vm-two".to_string(),
            count: 12,
        },
    ]
}

#[test]
fn test_parse_fields() {
    let formatters = test_formatters();
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["count".to_string(), "name".to_string()]);
    let (fields, others) = parse_fields("all,csv,bogus", &formatters, &aliases).unwrap();
    assert!(fields == vec!["count", "name"]);
    assert!(others.contains("csv"));
    assert!(unknown_words(&others) == vec!["bogus"]);
    assert!(parse_fields("csv", &formatters, &aliases).is_err());
}

#[test]
fn test_format_fixed() {
    let formatters = test_formatters();
    let aliases = HashMap::new();
    let (fields, others) = parse_fields("count,name", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::<u8>::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), ()).unwrap();
    let out = String::from_utf8(out).unwrap();
    let lines = out.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 4);
    assert!(lines[0] == " count | name");
    assert!(lines[1] == "-------+--------");
    assert!(lines[2] == "     7 | vm one");
    assert!(lines[3] == "    12 | vm-two");
}

#[test]
fn test_format_csv_and_awk() {
    let formatters = test_formatters();
    let aliases = HashMap::new();

    let (fields, others) = parse_fields("name,count,csvnamed", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    assert!(!opts.header);
    let mut out = Vec::<u8>::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), ()).unwrap();
    assert!(String::from_utf8(out).unwrap() == "name=vm one,count=7\nname=vm-two,count=12\n");

    let (fields, others) = parse_fields("name,count,awk", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::<u8>::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), ()).unwrap();
    assert!(String::from_utf8(out).unwrap() == "vm_one 7\nvm-two 12\n");
}

#[test]
fn test_format_json() {
    let formatters = test_formatters();
    let aliases = HashMap::new();
    let (fields, others) = parse_fields("name,json", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::<u8>::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), ()).unwrap();
    assert!(String::from_utf8(out).unwrap() == r#"[{"name":"vm one"},{"name":"vm-two"}]"#);
}

/// Find and read vSAN trace files.
///
/// The traces are either a single named file or whatever files in a set of directories match
/// `<prefix>*.txt` or `<prefix>*.log`.  The prefix selects the trace family, eg `vsantraces--`
/// for the main traces and `vsantracesUrgent--` for the urgent ones.

use crate::errors::VsanError;
use crate::trace::TraceSource;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use vsanutils::FileGlobber;

pub const DEFAULT_TRACE_PREFIX: &str = "vsantraces--";

pub const TRACE_EXTENSIONS: &[&str] = &["txt", "log"];

/// Where to look for traces.

#[derive(Debug, Clone)]
pub enum TraceLocation {
    File(PathBuf),
    Dirs(Vec<PathBuf>),
}

/// Return the trace files at the location, sorted by name within each directory, directories in
/// the order given.
///
/// A named file must exist.  A directory that does not exist or has no trace files in it is
/// reported in the log and otherwise ignored.  Subdirectories are not searched and file names that
/// are not UTF8 are ignored.

pub fn find_trace_files(location: &TraceLocation, prefix: &str) -> Result<Vec<PathBuf>> {
    let dirs = match location {
        TraceLocation::File(p) => {
            if !p.is_file() {
                bail!("No such trace file: {}", p.display());
            }
            return Ok(vec![p.clone()]);
        }
        TraceLocation::Dirs(dirs) => dirs,
    };

    let mut globber = FileGlobber::new();
    globber.insert(&format!("{prefix}*.{{{}}}", TRACE_EXTENSIONS.join(",")))?;
    log::info!(
        "Looking for vSAN trace files named {}",
        globber.patterns().join(", ")
    );

    let mut filenames = vec![];
    for dir in dirs {
        if !dir.is_dir() {
            log::warn!("No such directory: {}", dir.display());
            continue;
        }
        let mut found = vec![];
        let rd = dir
            .read_dir()
            .with_context(|| format!("Reading directory {}", dir.display()))?;
        for entry in rd {
            // Bad directory entries are ignored, like everywhere else.
            let Ok(entry) = entry else {
                continue;
            };
            let p = entry.path();
            if !p.is_file() {
                continue;
            }
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if globber.match_filename(name) {
                found.push(p);
            }
        }
        if found.is_empty() {
            log::warn!("No vSAN trace files found in directory {}", dir.display());
        }
        found.sort();
        filenames.extend(found);
    }
    log::info!("{} trace files selected", filenames.len());
    Ok(filenames)
}

/// Read the files into memory.  A file that is not plain text (not UTF8, or containing NUL bytes)
/// is an error, as is any I/O error.

pub fn read_trace_files(paths: &[PathBuf]) -> Result<Vec<TraceSource>> {
    let mut sources = vec![];
    for p in paths {
        sources.push(read_trace_file(p)?);
    }
    Ok(sources)
}

fn read_trace_file(p: &Path) -> Result<TraceSource> {
    let name = p.display().to_string();
    let bytes = fs::read(p).with_context(|| format!("Reading trace file {name}"))?;
    if bytes.contains(&0u8) {
        return Err(VsanError::NotPlainText(name).into());
    }
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Err(VsanError::NotPlainText(name).into()),
    };
    log::debug!("Read {} bytes from {name}", text.len());
    Ok(TraceSource { name, text })
}

#[cfg(test)]
fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_find_trace_files_whitebox() {
    let loc = TraceLocation::Dirs(vec![PathBuf::from("../tests/vsanlog")]);
    let files = find_trace_files(&loc, DEFAULT_TRACE_PREFIX).unwrap();
    assert!(
        file_names(&files)
            == vec![
                "vsantraces--2019-05-06T10h00m00s000.txt",
                "vsantraces--2019-05-06T11h00m00s000.log"
            ]
    );

    let files = find_trace_files(&loc, "vsantracesUrgent--").unwrap();
    assert!(file_names(&files) == vec!["vsantracesUrgent--2019-05-06T10h00m00s000.txt"]);
}

#[test]
fn test_find_trace_files_skips_missing_dirs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("vsantraces--b.log"), "b\n").unwrap();
    fs::write(dir.path().join("vsantraces--a.txt"), "a\n").unwrap();
    fs::write(dir.path().join("vsantraces--c.gz"), "c\n").unwrap();
    fs::create_dir(dir.path().join("vsantraces--d.txt")).unwrap();

    let loc = TraceLocation::Dirs(vec![
        dir.path().join("nonexistent"),
        dir.path().to_path_buf(),
    ]);
    let files = find_trace_files(&loc, DEFAULT_TRACE_PREFIX).unwrap();
    assert!(file_names(&files) == vec!["vsantraces--a.txt", "vsantraces--b.log"]);

    let loc = TraceLocation::Dirs(vec![dir.path().join("nonexistent")]);
    assert!(find_trace_files(&loc, DEFAULT_TRACE_PREFIX).unwrap().is_empty());
}

#[test]
fn test_find_single_trace_file() {
    let p = PathBuf::from("../tests/vsanlog/notes.txt");
    let files = find_trace_files(&TraceLocation::File(p.clone()), DEFAULT_TRACE_PREFIX).unwrap();
    assert!(files == vec![p]);

    let p = PathBuf::from("../tests/vsanlog/no-such-file.txt");
    assert!(find_trace_files(&TraceLocation::File(p), DEFAULT_TRACE_PREFIX).is_err());
}

#[test]
fn test_read_trace_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("vsantraces--a.txt");
    let binary = dir.path().join("vsantraces--b.txt");
    let latin1 = dir.path().join("vsantraces--c.txt");
    fs::write(&good, "line 1\nline 2\n").unwrap();
    fs::write(&binary, b"\x00\x01\x02trace").unwrap();
    fs::write(&latin1, b"caf\xe9\n").unwrap();

    let sources = read_trace_files(&[good.clone()]).unwrap();
    assert!(sources.len() == 1);
    assert!(sources[0].text.lines().count() == 2);

    for bad in [binary, latin1] {
        let e = read_trace_files(&[good.clone(), bad]).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<VsanError>(),
            Some(VsanError::NotPlainText(_))
        ));
    }
}

// Producing a CMMDS dump when none was given.  On an ESXi host the dump comes from cmmds-tool;
// the dump is written to a scratch file that is removed again once it has been parsed.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use subprocess::{Exec, Redirection};
use vsanlog::{read_and_remove_dump, RawRecord};

pub trait DumpProducer {
    /// Write a fresh CMMDS dump to `out`.
    fn produce(&self, out: &Path) -> Result<()>;
}

pub struct CmmdsTool {
    program: String,
    args: Vec<String>,
}

impl CmmdsTool {
    /// `cmmds-tool find -f python`
    pub fn new() -> CmmdsTool {
        CmmdsTool::with_command("cmmds-tool", &["find", "-f", "python"])
    }

    pub fn with_command(program: &str, args: &[&str]) -> CmmdsTool {
        CmmdsTool {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn command_line(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s += " ";
            s += a;
        }
        s
    }
}

impl Default for CmmdsTool {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpProducer for CmmdsTool {
    fn produce(&self, out: &Path) -> Result<()> {
        let cmd = self.command_line();
        log::info!("Running {cmd}");
        let result = Exec::cmd(&self.program)
            .args(self.args.as_slice())
            .stdout(Redirection::Pipe)
            .stderr(Redirection::Pipe)
            .capture()
            .with_context(|| format!("Could not run {cmd}"))?;
        if !result.exit_status.success() {
            bail!(
                "Error running {cmd}: {:?} {}",
                result.exit_status,
                result.stderr_str().trim()
            );
        }
        fs::write(out, &result.stdout)
            .with_context(|| format!("Writing CMMDS dump to {}", out.display()))?;
        Ok(())
    }
}

/// A scratch location for a generated dump.

pub fn scratch_dump_path() -> PathBuf {
    env::temp_dir().join(format!("vsanalyze-cmmds-{}.txt", process::id()))
}

/// Have the producer write a dump to `scratch`, then read, parse and remove it.  If the dump cannot
/// be parsed it is left behind for inspection.

pub fn produce_and_read(producer: &dyn DumpProducer, scratch: &Path) -> Result<Vec<RawRecord>> {
    producer.produce(scratch)?;
    read_and_remove_dump(scratch)
}

#[test]
fn test_produce_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("cmmds.txt");
    let tool = CmmdsTool::with_command("cat", &["../tests/vsanlog/whitebox-cmmds.txt"]);
    let records = produce_and_read(&tool, &scratch).unwrap();
    // 2 hosts, 2 disks, 3 objects, 2 names
    assert!(records.len() == 9);
    assert!(!scratch.exists());
}

#[test]
fn test_producer_failure() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("cmmds.txt");
    let tool = CmmdsTool::with_command("false", &[]);
    assert!(produce_and_read(&tool, &scratch).is_err());
    assert!(!scratch.exists());

    let tool = CmmdsTool::with_command("no-such-cmmds-tool-anywhere", &[]);
    assert!(tool.produce(&scratch).is_err());
}

#[test]
fn test_default_command() {
    assert!(CmmdsTool::new().command_line() == "cmmds-tool find -f python");
}

/// Readers and analyses for the two kinds of vSAN diagnostic data found in a log bundle.
///
/// A *CMMDS dump* is a snapshot of the cluster metadata directory.  It enumerates entries of many
/// types, of which four matter here: DOM objects (with their components), DOM names (the
/// user-visible names of object groups, typically VM names), hosts and disks.  The dump is a JSON
/// array whose `content` fields are text that is almost but not quite JSON; the entries are read
/// by `dump`, the contents are picked apart by `extract`, and the result is reconciled into a
/// `Topology` in which every reference resolves, if only to a sentinel.
///
/// *vSAN traces* are free-text logs.  The `trace` module correlates the lines that announce
/// read-modify-write operations with the lines that time them, producing one record per completed
/// operation, and `align` says whether the write that caused it was block aligned.
///
/// Everything here is single-threaded and reads its inputs fully into memory.
mod align;
mod dump;
mod errors;
mod extract;
mod topology;
mod trace;
mod tracefiles;

// Error conditions callers need to tell apart, carried inside anyhow::Error.

pub use errors::VsanError;

// Raw CMMDS dump entries of the four interesting kinds.

pub use dump::RawRecord;
pub use dump::RecordKind;

// Read, repair and parse a CMMDS dump file.  The second variant deletes the file after parsing.

pub use dump::read_and_remove_dump;
pub use dump::read_dump;

// Make the tail of a truncated CMMDS dump well-formed; and parse the repaired text.

pub use dump::parse_dump;
pub use dump::repair_dump;

// A component of a DOM object, and the outcome of looking for a friendly name.

pub use extract::Component;
pub use extract::FriendlyName;

// The reconciled object / component / disk / host / name graph.

pub use topology::DiskDevice;
pub use topology::HostRecord;
pub use topology::StorageObject;
pub use topology::Topology;

// How to render a friendly name that is present but empty.

pub use topology::EmptyNamePolicy;

// Decode component state and object class codes; unknown codes are VsanError::OutOfRange.

pub use topology::resolve_component_state;
pub use topology::resolve_object_class;

// Sentinel display strings.

pub use topology::EMPTY_NAME;
pub use topology::NOT_FOUND;

// Two-pass RMW correlation over trace text.

pub use trace::RmwIoRecord;
pub use trace::ScanStats;
pub use trace::TraceScanner;
pub use trace::TraceSource;

// Locate trace files in directories by prefix, and read them.

pub use tracefiles::find_trace_files;
pub use tracefiles::read_trace_files;
pub use tracefiles::TraceLocation;
pub use tracefiles::DEFAULT_TRACE_PREFIX;

// Block alignment of write lengths.

pub use align::is_unaligned;
pub use align::BLOCK_SIZE;

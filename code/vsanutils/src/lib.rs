// Misc utilities useful to both vsanlog and vsanalyze.

mod dates;
mod fileglob;
mod uuids;

// Types and utilities for manipulating timestamps.

pub use dates::Timestamp;

// Parse the date and time parts of a trace line prefix ("YYYY-MM-DD", "HH:MM:SS.ffffff") into a
// Timestamp.  Trace times carry no zone and are taken to be UTC.

pub use dates::parse_trace_timestamp;

// Format a Timestamp the way trace lines print it, "YYYY-MM-DDTHH:MM:SS.ffffff".

pub use dates::format_trace_timestamp;

// Render a latency as a fixed-width string of units, "1min 2s 500ms 000us", right-aligned in
// LATENCY_WIDTH characters.

pub use dates::format_latency;
pub use dates::LATENCY_WIDTH;

// Structure representing a file name filter: a set of glob patterns compiled to regular
// expressions.

pub use fileglob::FileGlobber;

// Regular expression source text for a CMMDS UUID, and the all-zero UUID used for sentinels.

pub use uuids::UUID_PATTERN;
pub use uuids::ZERO_UUID;

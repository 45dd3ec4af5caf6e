/// Error conditions that callers may want to tell apart.  These travel inside anyhow::Error and
/// are recovered with `downcast_ref::<VsanError>()`; everything else is just a message.

use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VsanError {
    /// The CMMDS dump file does not exist.
    DumpNotFound(String),

    /// The tail of the CMMDS dump is not one of the shapes we know how to fix.
    DumpUnrepairable(String),

    /// A trace source is not a plain text file.
    NotPlainText(String),

    /// A numeric code from the dump has no entry in the table it indexes.  `what` names the table.
    OutOfRange { what: &'static str, code: i64 },
}

impl fmt::Display for VsanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VsanError::DumpNotFound(path) => write!(f, "CMMDS dump file not found: {path}"),
            VsanError::DumpUnrepairable(why) => {
                write!(f, "Could not rectify the ending of the CMMDS dump: {why}")
            }
            VsanError::NotPlainText(path) => {
                write!(f, "Provided vSAN trace file is not in text format: {path}")
            }
            VsanError::OutOfRange { what, code } => write!(f, "Unknown {what} code {code}"),
        }
    }
}

impl error::Error for VsanError {}

#[test]
fn test_error_messages() {
    let e = anyhow::Error::new(VsanError::OutOfRange {
        what: "component state",
        code: 13,
    });
    assert!(e.to_string() == "Unknown component state code 13");
    assert!(matches!(
        e.downcast_ref::<VsanError>(),
        Some(VsanError::OutOfRange { code: 13, .. })
    ));
}

use std::fmt;

/// Fatal decode/encode errors.
///
/// These are returned through [`anyhow::Error`] so call sites can attach
/// context; use `err.downcast_ref::<AinbError>()` to match on the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AinbError {
    InvalidMagic {
        expected: &'static str,
        found: [u8; 4],
    },
    UnsupportedVersion {
        version: u32,
    },
    OutOfBounds {
        position: usize,
        requested: usize,
        len: usize,
    },
    InvalidUtf8 {
        position: usize,
    },
    NoStringPool,
    InvalidEnumValue {
        what: &'static str,
        value: i64,
        position: usize,
    },
    InvalidDefaultCase {
        message: String,
        position: usize,
    },
    InvalidReference {
        what: &'static str,
        index: usize,
        len: usize,
    },
    DictDecode(String),
}

impl fmt::Display for AinbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AinbError::InvalidMagic { expected, found } => {
                write!(
                    f,
                    "Invalid magic, expected {expected:?} but got {found:?}"
                )
            }
            AinbError::UnsupportedVersion { version } => {
                write!(f, "Unsupported version: {version:#x}")
            }
            AinbError::OutOfBounds {
                position,
                requested,
                len,
            } => {
                write!(
                    f,
                    "Read of {requested} bytes at {position:#x} exceeds \
                     buffer of {len:#x} bytes"
                )
            }
            AinbError::InvalidUtf8 { position } => {
                write!(f, "String at {position:#x} is not valid UTF-8")
            }
            AinbError::NoStringPool => {
                write!(f, "String offset resolved before string pool install")
            }
            AinbError::InvalidEnumValue {
                what,
                value,
                position,
            } => {
                write!(f, "Invalid {what} value {value} at {position:#x}")
            }
            AinbError::InvalidDefaultCase { message, position } => {
                write!(f, "{message} (at {position:#x})")
            }
            AinbError::InvalidReference { what, index, len } => {
                write!(
                    f,
                    "{what} index {index} out of range (table holds {len})"
                )
            }
            AinbError::DictDecode(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AinbError {}

/// Non-fatal diagnostic categories. A decode never aborts on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    InconsistentNodeIndex,
    MissingModule,
    CategoryMismatch,
    EmptyEnumDb,
    UnknownEnumEntry,
    OutOfBoundsEnumPatch,
    ReservedFieldSet,
    ReplacementsAlreadyApplied,
    UnsupportedReplacementTable,
    UnexpectedStateInfo,
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    /// Buffer position the diagnostic was raised at, when one exists.
    pub position: Option<usize>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => {
                write!(f, "[{:?}] {} (at {position:#x})", self.kind, self.message)
            }
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

/// Out-of-band sink for decode diagnostics.
pub trait WarningSink {
    fn emit(&mut self, warning: Warning);
}

/// Default sink, writes diagnostics to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl WarningSink for StderrSink {
    fn emit(&mut self, warning: Warning) {
        eprintln!("warning: {warning}");
    }
}

/// Sink that keeps every diagnostic, mostly useful for tests and embedders
/// that surface warnings through their own channels.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub warnings: Vec<Warning>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

impl WarningSink for CollectSink {
    fn emit(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

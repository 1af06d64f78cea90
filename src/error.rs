//! Error types and handling for memglass

/// Result type alias for memglass operations
pub type Result<T> = std::result::Result<T, MemglassError>;

/// Error types surfaced by the memglass core
#[derive(Debug, thiserror::Error)]
pub enum MemglassError {
    /// The session header could not be opened or mapped
    #[error("Session unavailable: {message}")]
    SessionUnavailable { message: String },

    /// Header magic or protocol version does not match
    #[error("Protocol mismatch: expected {expected:#x}, got {actual:#x}")]
    ProtocolMismatch { expected: u64, actual: u64 },

    /// An allocation cannot be satisfied
    #[error("Out of space: requested {requested}, available {available}")]
    OutOfSpace { requested: usize, available: usize },

    /// A create request found an existing shared-memory name
    #[error("Name conflict: {name}")]
    NameConflict { name: String },

    /// A type id collides with an incompatible existing schema
    #[error("Type already registered with a different schema: {name} (id {type_id:#x})")]
    AlreadyRegistered { name: String, type_id: u32 },

    /// A field path does not resolve
    #[error("Invalid field: {path}")]
    InvalidField { path: String },

    /// Pointer not within any region, or entry state not usable
    #[error("Invalid object: {message}")]
    InvalidObject { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl MemglassError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a session-unavailable error
    pub fn session_unavailable(message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            message: message.into(),
        }
    }

    /// Create a protocol mismatch error
    pub fn protocol_mismatch(expected: u64, actual: u64) -> Self {
        Self::ProtocolMismatch { expected, actual }
    }

    /// Create an out-of-space error
    pub fn out_of_space(requested: usize, available: usize) -> Self {
        Self::OutOfSpace {
            requested,
            available,
        }
    }

    /// Create a name conflict error
    pub fn name_conflict(name: impl Into<String>) -> Self {
        Self::NameConflict { name: name.into() }
    }

    /// Create an already-registered error
    pub fn already_registered(name: impl Into<String>, type_id: u32) -> Self {
        Self::AlreadyRegistered {
            name: name.into(),
            type_id,
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(path: impl Into<String>) -> Self {
        Self::InvalidField { path: path.into() }
    }

    /// Create an invalid object error
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for MemglassError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

/// Convenience result type used across the crate.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Top-level error taxonomy for a conversion request.
///
/// Every variant is terminal for the request that raised it. The CLI maps variants to
/// process exit codes with [`ConvertError::exit_code`]; the HTTP adapter maps them to status
/// codes with [`ConvertError::http_status`].
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    /// The meico artifact or the Java runtime backing it is unavailable.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// An input path is empty, missing, or not a regular file.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Neither an MEI nor an MSM score was supplied.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// An MEI, MSM or MPM document could not be parsed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The score yielded no usable content. `code` is the exit status to report.
    #[error("empty result: {message}")]
    EmptyResult {
        /// Process exit status for this condition (1 or 66).
        code: u8,
        /// Human-readable description.
        message: String,
    },

    /// The rendered MIDI could not be persisted or read back.
    #[error("write error: {0}")]
    Write(String),

    /// The bridge process misbehaved (crashed, closed its pipes, or sent garbage).
    #[error("bridge error: {0}")]
    Bridge(String),
}

impl ConvertError {
    /// Build a [`ConvertError::MissingDependency`] value.
    pub fn missing_dependency(msg: impl Into<String>) -> Self {
        Self::MissingDependency(msg.into())
    }

    /// Build a [`ConvertError::FileNotFound`] value.
    pub fn file_not_found(msg: impl Into<String>) -> Self {
        Self::FileNotFound(msg.into())
    }

    /// Build a [`ConvertError::MissingInput`] value.
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Build a [`ConvertError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Empty source document (exit 66).
    pub fn empty_source(msg: impl Into<String>) -> Self {
        Self::EmptyResult {
            code: 66,
            message: msg.into(),
        }
    }

    /// Export produced no sequence data (exit 1).
    pub fn empty_export(msg: impl Into<String>) -> Self {
        Self::EmptyResult {
            code: 1,
            message: msg.into(),
        }
    }

    /// Build a [`ConvertError::Write`] value.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Build a [`ConvertError::Bridge`] value.
    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }

    /// Process exit status, following `sysexits.h` where a code exists.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingDependency(_) => 69,
            Self::FileNotFound(_) | Self::MissingInput(_) => 66,
            Self::InvalidInput(_) => 65,
            Self::EmptyResult { code, .. } => *code,
            Self::Write(_) => 73,
            Self::Bridge(_) => 70,
        }
    }

    /// HTTP status code for the HTTP adapter.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FileNotFound(_) | Self::MissingInput(_) | Self::InvalidInput(_) => 400,
            Self::EmptyResult { .. } => 422,
            Self::MissingDependency(_) => 503,
            Self::Write(_) | Self::Bridge(_) => 500,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingDependency(_) => "missing_dependency",
            Self::FileNotFound(_) => "file_not_found",
            Self::MissingInput(_) => "missing_input",
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptyResult { .. } => "empty_result",
            Self::Write(_) => "write",
            Self::Bridge(_) => "bridge",
        }
    }
}

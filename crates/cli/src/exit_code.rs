//! Exit code definitions for the s3crypt CLI
//!
//! Scripts only need to tell success from failure, so every failure,
//! including a rejected command line, exits with 1.

/// Exit codes for the s3crypt CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Transfer completed successfully
    Success = 0,

    /// Any failure
    GeneralError = 1,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            _ => None,
        }
    }

    /// Exit code for a failed run
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.downcast_ref::<sc_core::Error>()
            .and_then(|e| Self::from_i32(e.exit_code()))
            .unwrap_or(Self::GeneralError)
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Transfer completed successfully",
            Self::GeneralError => "Transfer failed",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

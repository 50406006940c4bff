//! Exit status codes for the CLI
//!
//! - 0: the final response was 2xx
//! - 1: any other response, or an error (transport, credential, config)
//! - 130: interrupted (Ctrl+C, standard SIGINT exit code)

use std::process::{ExitCode, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    /// Success for 2xx, Error for anything else. An unanswered 401 is an
    /// Error like any other failure status.
    pub fn from_http_status(status_code: u16) -> Self {
        if (200..300).contains(&status_code) {
            ExitStatus::Success
        } else {
            ExitStatus::Error
        }
    }
}

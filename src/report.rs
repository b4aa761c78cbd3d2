//! Machine-readable run reports and CI exit codes.

use serde::Serialize;

use crate::error::{Error, Result};

/// Process exit code for a passing or completed run.
pub const EXIT_PASS: u8 = 0;

/// Process exit code for a failed run.
pub const EXIT_FAIL: u8 = 1;

/// A finished run that can be printed for humans, dumped as JSON and turned
/// into an exit code.
pub trait Report: Serialize + std::fmt::Display {
    /// Returns `true` if the run met its goal.
    fn passed(&self) -> bool;

    /// [`EXIT_PASS`] or [`EXIT_FAIL`].
    fn exit_code(&self) -> u8 {
        if self.passed() { EXIT_PASS } else { EXIT_FAIL }
    }

    /// Pretty-printed JSON form.
    ///
    /// # Errors
    ///
    /// `Error::Encode` if serialization fails.
    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Encode(e.to_string()))
    }
}

/// Serialize a `Duration` as fractional seconds.
pub(crate) mod seconds {
    use std::time::Duration;

    use serde::Serializer;

    pub(crate) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

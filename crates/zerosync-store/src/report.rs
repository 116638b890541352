//! Degrade-and-report handling for recoverable failures.
//!
//! Store, filesystem, and transport failures never abort the calling cycle.
//! The operation degrades to "no effect" (empty read, skipped write) and the
//! failure is reported to the tracing sink with the operation name and the
//! underlying error text. There is no retry; the next indexer tick or
//! transport callback re-attempts on its own schedule.

use std::fmt::Display;

/// Extension for turning a failed result into its "no effect" value.
pub trait ReportExt<T> {
    /// Return the value, or report the error under `op` and return `T::default()`.
    fn or_report(self, op: &'static str) -> T
    where
        T: Default;

    /// Return `Some(value)`, or report the error under `op` and return `None`.
    fn reported(self, op: &'static str) -> Option<T>;
}

impl<T, E: Display> ReportExt<T> for std::result::Result<T, E> {
    fn or_report(self, op: &'static str) -> T
    where
        T: Default,
    {
        self.reported(op).unwrap_or_default()
    }

    fn reported(self, op: &'static str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(op, error = %e, "operation failed, skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_or_report_degrades_to_default() {
        let failed: std::result::Result<Vec<u32>, StoreError> =
            Err(StoreError::Unavailable("closed".into()));
        assert!(failed.or_report("changed_records").is_empty());

        let ok: std::result::Result<u64, StoreError> = Ok(7);
        assert_eq!(ok.or_report("latest_state"), 7);
    }

    #[test]
    fn test_reported_keeps_value() {
        let failed: std::result::Result<u8, String> = Err("boom".into());
        assert_eq!(failed.reported("op"), None);
        assert_eq!(Ok::<u8, String>(1).reported("op"), Some(1));
    }
}

//! Begin/complete bracketing for multi-step operations
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` on `complete()`, with the elapsed time
//! - `{name}_FAILED` on `fail()`
//! - `{name}_INCOMPLETE` on drop if neither was called

use std::time::Instant;

use super::logger::{Logger, Severity};

/// Logs the lifecycle of one operation.
///
/// ```ignore
/// let scope = ObservationScope::new("SPECIAL_DN_PROPAGATE", &[("dn", "@OPTIONS")]);
/// // ... copy to each partition ...
/// scope.complete(&[("partitions", "3")]);
/// ```
pub struct ObservationScope {
    name: &'static str,
    severity: Severity,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    /// Open a scope logged at INFO.
    pub fn new(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        Self::with_severity(name, Severity::Info, fields)
    }

    /// Open a scope whose begin/complete lines use `severity`.
    pub fn with_severity(
        name: &'static str,
        severity: Severity,
        fields: &[(&'static str, &str)],
    ) -> Self {
        let scope = Self {
            name,
            severity,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
            finished: false,
        };
        scope.emit(severity, "BEGIN", &[]);
        scope
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        if !Logger::enabled(severity) {
            return;
        }
        let event = format!("{}_{}", self.name, suffix);
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend_from_slice(extra);
        Logger::log(severity, &event, &fields);
    }

    /// Milliseconds since the scope was opened.
    pub fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    /// Close the scope successfully.
    pub fn complete(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut fields = extra.to_vec();
        fields.push(("elapsed_ms", &elapsed));
        self.emit(self.severity, "COMPLETE", &fields);
    }

    /// Close the scope with a failure.
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        self.emit(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_complete() {
        let scope = ObservationScope::new("TEST", &[("dn", "@OPTIONS")]);
        assert!(!scope.is_finished());
        scope.complete(&[("partitions", "2")]);
    }

    #[test]
    fn test_scope_fail() {
        let scope = ObservationScope::with_severity("TEST", Severity::Trace, &[]);
        scope.fail("busy");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST", &[]);
        drop(scope);
    }

    #[test]
    fn test_elapsed_is_numeric() {
        let scope = ObservationScope::new("TEST", &[]);
        let ms: u128 = scope.elapsed_ms().parse().unwrap();
        assert!(ms < 60_000);
        scope.complete(&[]);
    }
}

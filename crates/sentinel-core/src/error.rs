//! Classified errors
//!
//! Every fault raised inside the runtime is a [`SentinelError`]: a
//! message plus a category, a severity grade, structured details, and the
//! originating component. Foreign errors are wrapped and classified at
//! the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    Network,
    Sensor,
    Blockchain,
    Security,
    Configuration,
    Hardware,
    Software,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Network,
        ErrorCategory::Sensor,
        ErrorCategory::Blockchain,
        ErrorCategory::Security,
        ErrorCategory::Configuration,
        ErrorCategory::Hardware,
        ErrorCategory::Software,
        ErrorCategory::Unknown,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    /// Recoverable errors run the registered recovery strategy;
    /// Critical additionally triggers the emergency protocol.
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorSeverity::Warning | ErrorSeverity::Error)
    }
}

/// Classified, graded error value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelError {
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub details: Value,
    pub origin_component: Option<String>,
    /// Call-site breadcrumbs, innermost last.
    pub trace: Vec<String>,
}

impl SentinelError {
    pub fn new(
        message: impl Into<String>,
        category: ErrorCategory,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            message: message.into(),
            category,
            severity,
            details: Value::Null,
            origin_component: None,
            trace: Vec::new(),
        }
    }

    /// Wrap a foreign error, classifying it by message content the way
    /// the boundary contract requires: connection/timeout faults are
    /// Network, parameter/type faults are Software, anything else is
    /// Unknown.
    pub fn wrap(err: &dyn std::error::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        let (category, severity) = if lowered.contains("connection") || lowered.contains("timeout")
        {
            (ErrorCategory::Network, ErrorSeverity::Error)
        } else if lowered.contains("parameter") || lowered.contains("type") {
            (ErrorCategory::Software, ErrorSeverity::Warning)
        } else {
            (ErrorCategory::Unknown, ErrorSeverity::Error)
        };
        Self::new(message, category, severity)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_origin(mut self, component: impl Into<String>) -> Self {
        self.origin_component = Some(component.into());
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl std::fmt::Display for SentinelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:?}/{:?}] {}",
            self.category, self.severity, self.message
        )?;
        if let Some(origin) = &self.origin_component {
            write!(f, " (from {origin})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SentinelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(String);
    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }
    impl std::error::Error for Plain {}

    #[test]
    fn test_wrap_classifies_network() {
        let e = Plain("connection refused by peer".into());
        let wrapped = SentinelError::wrap(&e);
        assert_eq!(wrapped.category, ErrorCategory::Network);
        assert_eq!(wrapped.severity, ErrorSeverity::Error);
    }

    #[test]
    fn test_wrap_classifies_software() {
        let e = Plain("invalid parameter: altitude".into());
        let wrapped = SentinelError::wrap(&e);
        assert_eq!(wrapped.category, ErrorCategory::Software);
        assert_eq!(wrapped.severity, ErrorSeverity::Warning);
    }

    #[test]
    fn test_wrap_defaults_to_unknown() {
        let e = Plain("gyroscope drift beyond budget".into());
        assert_eq!(SentinelError::wrap(&e).category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_recoverable_grades() {
        assert!(ErrorSeverity::Warning.is_recoverable());
        assert!(ErrorSeverity::Error.is_recoverable());
        assert!(!ErrorSeverity::Critical.is_recoverable());
        assert!(!ErrorSeverity::Info.is_recoverable());
    }
}

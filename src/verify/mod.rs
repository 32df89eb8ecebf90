//! Reducing probe output to a verdict.
//!
//! Outputs are compared after trimming surrounding whitespace. Numeric
//! outputs (listener counts, HTTP status codes) are parsed before comparison
//! by [`assert_count`] and [`assert_status`]; [`assert_prefix`] keeps the
//! older fixed-width comparison.

use std::fmt;

/// Where a probe ran and what it did, for failure messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeContext {
    pub check: String,
    pub target: String,
    pub probe: String,
}

impl ProbeContext {
    pub fn new(check: &str, target: &str, probe: &str) -> Self {
        Self {
            check: check.to_string(),
            target: target.to_string(),
            probe: probe.to_string(),
        }
    }
}

/// An unmet expectation, with enough context to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub check: String,
    pub target: String,
    pub probe: String,
    pub expected: String,
    pub actual: String,
}

impl Failure {
    fn new(context: &ProbeContext, expected: impl Into<String>, actual: &str) -> Self {
        Self {
            check: context.check.clone(),
            target: context.target.clone(),
            probe: context.probe.clone(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {}: expected {:?}, got {:?}",
            self.check, self.target, self.probe, self.expected, self.actual
        )
    }
}

impl std::error::Error for Failure {}

/// What a probe's output should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutcome {
    /// Output equals the string exactly.
    Exact(String),
    /// Output starts with the string (fixed-width comparison).
    Prefix(String),
    /// Leading token of the output is this HTTP status code.
    Status(u16),
    /// Output parses as this integer.
    Count(u64),
}

impl ExpectedOutcome {
    /// Checks trimmed `actual` against this expectation.
    pub fn check(&self, actual: &str, context: &ProbeContext) -> Result<(), Failure> {
        match self {
            ExpectedOutcome::Exact(expected) => assert_equals(expected, actual, context),
            ExpectedOutcome::Prefix(prefix) => assert_prefix(prefix, actual, context),
            ExpectedOutcome::Status(code) => assert_status(*code, actual, context),
            ExpectedOutcome::Count(count) => assert_count(*count, actual, context),
        }
    }
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedOutcome::Exact(s) => write!(f, "{:?}", s),
            ExpectedOutcome::Prefix(s) => write!(f, "prefix {:?}", s),
            ExpectedOutcome::Status(code) => write!(f, "status {}", code),
            ExpectedOutcome::Count(n) => write!(f, "count {}", n),
        }
    }
}

pub fn assert_equals(expected: &str, actual: &str, context: &ProbeContext) -> Result<(), Failure> {
    let actual = actual.trim();
    if actual == expected {
        Ok(())
    } else {
        Err(Failure::new(context, expected, actual))
    }
}

/// Compares the first `expected_prefix.len()` characters of `actual`.
///
/// `"2001"` satisfies prefix `"200"`; use [`assert_status`] where that matters.
pub fn assert_prefix(
    expected_prefix: &str,
    actual: &str,
    context: &ProbeContext,
) -> Result<(), Failure> {
    let actual = actual.trim();
    let width = expected_prefix.chars().count();
    let head: String = actual.chars().take(width).collect();
    if head == expected_prefix {
        Ok(())
    } else {
        Err(Failure::new(context, expected_prefix, &head))
    }
}

/// Parses the leading token of `actual` as an HTTP status code.
pub fn assert_status(expected: u16, actual: &str, context: &ProbeContext) -> Result<(), Failure> {
    let token = actual.split_whitespace().next().unwrap_or("");
    match token.parse::<u16>() {
        Ok(code) if code == expected => Ok(()),
        _ => Err(Failure::new(context, expected.to_string(), token)),
    }
}

pub fn assert_count(expected: u64, actual: &str, context: &ProbeContext) -> Result<(), Failure> {
    let actual = actual.trim();
    match actual.parse::<u64>() {
        Ok(count) if count == expected => Ok(()),
        _ => Err(Failure::new(context, expected.to_string(), actual)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ProbeContext {
        ProbeContext::new("http-internal", "10.0.0.5", "curl http://10.0.0.5:80")
    }

    #[test]
    fn test_assert_equals() {
        assert!(assert_equals("opc", "opc\n", &context()).is_ok());

        let failure = assert_equals("opc", "root", &context()).unwrap_err();
        assert_eq!(failure.expected, "opc");
        assert_eq!(failure.actual, "root");
    }

    #[test]
    fn test_assert_prefix() {
        assert!(assert_prefix("200", "200 OK extra-bytes", &context()).is_ok());

        let failure = assert_prefix("200", "404 Not Found", &context()).unwrap_err();
        assert_eq!(failure.actual, "404");
    }

    #[test]
    fn test_assert_prefix_short_output() {
        let failure = assert_prefix("200", "20", &context()).unwrap_err();
        assert_eq!(failure.actual, "20");
    }

    #[test]
    fn test_assert_status_matches_whole_token() {
        assert!(assert_status(200, "200", &context()).is_ok());
        assert!(assert_status(200, "200 OK", &context()).is_ok());
        assert!(assert_status(200, "2001", &context()).is_err());
        assert!(assert_status(200, "", &context()).is_err());

        // the fixed-width comparison accepts what the status check rejects
        assert!(assert_prefix("200", "2001", &context()).is_ok());
    }

    #[test]
    fn test_assert_count() {
        assert!(assert_count(1, " 1\n", &context()).is_ok());

        let failure = assert_count(1, "0", &context()).unwrap_err();
        assert_eq!(failure.expected, "1");
        assert_eq!(failure.actual, "0");

        assert!(assert_count(1, "one", &context()).is_err());
    }

    #[test]
    fn test_failure_message_names_everything() {
        let failure = assert_status(200, "404", &context()).unwrap_err();
        assert_eq!(
            failure.to_string(),
            "http-internal on 10.0.0.5: curl http://10.0.0.5:80: expected \"200\", got \"404\""
        );
    }

    #[test]
    fn test_expected_outcome_dispatch() {
        let ctx = context();
        assert!(ExpectedOutcome::Exact("true".to_string()).check("true", &ctx).is_ok());
        assert!(ExpectedOutcome::Prefix("200".to_string()).check("200 OK", &ctx).is_ok());
        assert!(ExpectedOutcome::Status(200).check("503", &ctx).is_err());
        assert!(ExpectedOutcome::Count(2).check("2", &ctx).is_ok());
    }
}

//! Grammar for the shim's synthetic change-stream names.
//!
//! `ewb_internal` opens an unbounded synthetic stream; `ewb_internal:<n>`
//! bounds it to `n` mutations. Any other name belongs to the wrapped engine.

use std::fmt;

/// Prefix selecting the synthetic stream.
pub const SYNTHETIC_STREAM_PREFIX: &str = "ewb_internal";

/// The count suffix did not parse as a decimal integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadStreamCount {
    /// The offending suffix.
    pub suffix: String,
}

impl fmt::Display for BadStreamCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad synthetic stream count {:?}", self.suffix)
    }
}

impl std::error::Error for BadStreamCount {}

/// Parse a stream name against the synthetic grammar.
///
/// Returns `None` when the name does not start with the synthetic prefix
/// (the open should be forwarded), `Some(Ok(count))` for a recognized name
/// (`u64::MAX` when no count is given), and `Some(Err(_))` when the name
/// matches the prefix but carries a malformed count.
pub fn parse_stream_name(name: &str) -> Option<Result<u64, BadStreamCount>> {
    if !name.starts_with(SYNTHETIC_STREAM_PREFIX) {
        return None;
    }
    match name.rfind(':') {
        None => Some(Ok(u64::MAX)),
        Some(idx) => {
            let suffix = &name[idx + 1..];
            Some(suffix.parse::<u64>().map_err(|_| BadStreamCount {
                suffix: suffix.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_prefix_is_unbounded() {
        assert_eq!(parse_stream_name("ewb_internal"), Some(Ok(u64::MAX)));
    }

    #[test]
    fn count_suffix_bounds_the_stream() {
        assert_eq!(parse_stream_name("ewb_internal:10"), Some(Ok(10)));
        assert_eq!(parse_stream_name("ewb_internal:0"), Some(Ok(0)));
    }

    #[test]
    fn foreign_names_are_not_synthetic() {
        assert_eq!(parse_stream_name("replication:vb0"), None);
        assert_eq!(parse_stream_name(""), None);
    }

    #[test]
    fn malformed_count_is_an_error() {
        let parsed = parse_stream_name("ewb_internal:ten");
        assert!(matches!(parsed, Some(Err(_))), "non-decimal count must fail, got {parsed:?}");
    }
}

//! Shim configuration.

use serde::Deserialize;

use fcache_types::control::DEFAULT_CONTROL_OPCODE;

/// Configuration for the fault-injection shim itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Opcode carrying control payloads. Everything else passes through.
    pub control_opcode: u8,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            control_opcode: DEFAULT_CONTROL_OPCODE,
        }
    }
}

/// A configuration string split into the wrapped engine's name and the
/// remainder forwarded to it verbatim.
///
/// The server hands the shim one string of the form `engine;tail`; the
/// engine itself is injected at construction, but the tail still belongs to
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfig<'a> {
    /// Name of the wrapped engine.
    pub engine: &'a str,
    /// Configuration forwarded to the wrapped engine.
    pub tail: &'a str,
}

/// Split `engine;tail`. A string with no separator is all engine name.
#[must_use]
pub fn split_config_str(config: &str) -> SplitConfig<'_> {
    match config.split_once(';') {
        Some((engine, tail)) => SplitConfig { engine, tail },
        None => SplitConfig {
            engine: config,
            tail: "",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_engine_and_tail() {
        let split = split_config_str("memory;cache_size=1024;foo=bar");
        assert_eq!(split.engine, "memory");
        assert_eq!(split.tail, "cache_size=1024;foo=bar");
    }

    #[test]
    fn bare_engine_name_has_empty_tail() {
        let split = split_config_str("memory");
        assert_eq!(split.engine, "memory");
        assert_eq!(split.tail, "");
    }

    #[test]
    fn default_opcode_is_the_control_opcode() {
        assert_eq!(ShimConfig::default().control_opcode, DEFAULT_CONTROL_OPCODE);
    }
}

//! Wire codec for the fault-injection control payload.
//!
//! The control opcode carries a fixed 12-byte extras section followed by the
//! request key:
//!
//! ```text
//! offset  size  field
//!      0     1  mode
//!      1     1  reserved (must decode, ignored)
//!      2     2  padding  (big-endian, ignored)
//!      4     4  value        (big-endian)
//!      8     4  inject_error (big-endian)
//! ```

use std::fmt;

/// Length of the fixed extras section.
pub const CONTROL_EXTRAS_LEN: usize = 12;

/// Default opcode carrying control payloads.
pub const DEFAULT_CONTROL_OPCODE: u8 = 0xeb;

/// Control modes a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlMode {
    /// Inject on the next `value` gated operations.
    NextN = 0,
    /// Inject with probability `value` percent.
    Random = 1,
    /// Inject on the first occurrence of each operation kind.
    First = 2,
    /// Inject per the 32-bit mask in `value`, one bit per call, LSB first.
    Sequence = 3,
    /// Inject key-exists on the next `value` compare-and-swap stores.
    CasMismatch = 4,
    /// Bump the cluster-map revision counter.
    IncrementClusterMapRevno = 5,
    /// Inject exactly once and never schedule a resume notification.
    NoNotify = 6,
    /// Suspend this cookie under token `value`.
    Suspend = 7,
    /// Resume the cookie suspended under token `value`.
    Resume = 8,
    /// Suspend under token `value` until the file named by the key vanishes.
    BlockMonitorFile = 9,
    /// Overwrite the CAS of the item named by the key with `value`.
    SetItemCas = 10,
}

impl ControlMode {
    /// Decode a raw mode byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::NextN),
            1 => Some(Self::Random),
            2 => Some(Self::First),
            3 => Some(Self::Sequence),
            4 => Some(Self::CasMismatch),
            5 => Some(Self::IncrementClusterMapRevno),
            6 => Some(Self::NoNotify),
            7 => Some(Self::Suspend),
            8 => Some(Self::Resume),
            9 => Some(Self::BlockMonitorFile),
            10 => Some(Self::SetItemCas),
            _ => None,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NextN => "next-n",
            Self::Random => "random",
            Self::First => "first",
            Self::Sequence => "sequence",
            Self::CasMismatch => "cas-mismatch",
            Self::IncrementClusterMapRevno => "increment-cluster-map-revno",
            Self::NoNotify => "no-notify",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::BlockMonitorFile => "block-monitor-file",
            Self::SetItemCas => "set-item-cas",
        };
        f.write_str(name)
    }
}

/// Reasons a control extras section fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPayloadError {
    /// The extras section is not exactly [`CONTROL_EXTRAS_LEN`] bytes.
    BadLength(usize),
    /// The mode byte names no known mode.
    UnknownMode(u8),
}

impl fmt::Display for ControlPayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(len) => {
                write!(f, "control extras must be {CONTROL_EXTRAS_LEN} bytes, got {len}")
            }
            Self::UnknownMode(raw) => write!(f, "unknown control mode {raw}"),
        }
    }
}

impl std::error::Error for ControlPayloadError {}

/// A decoded control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPayload {
    /// Requested mode.
    pub mode: ControlMode,
    /// Mode-specific value (count, percentage, mask, token, or CAS).
    pub value: u32,
    /// Wire code of the error to inject, for the injector-installing modes.
    pub inject_error: u32,
}

impl ControlPayload {
    /// Decode the fixed extras section.
    ///
    /// The mode byte must be known; the reserved and padding fields are
    /// ignored. Returns [`ControlPayloadError::UnknownMode`] so the caller
    /// can answer with an invalid-arguments status rather than guessing.
    pub fn decode(extras: &[u8]) -> Result<Self, ControlPayloadError> {
        if extras.len() != CONTROL_EXTRAS_LEN {
            return Err(ControlPayloadError::BadLength(extras.len()));
        }
        let mode = ControlMode::from_raw(extras[0])
            .ok_or(ControlPayloadError::UnknownMode(extras[0]))?;
        let value = u32::from_be_bytes([extras[4], extras[5], extras[6], extras[7]]);
        let inject_error = u32::from_be_bytes([extras[8], extras[9], extras[10], extras[11]]);
        Ok(Self {
            mode,
            value,
            inject_error,
        })
    }

    /// Encode the fixed extras section.
    #[must_use]
    pub fn encode(&self) -> [u8; CONTROL_EXTRAS_LEN] {
        let mut out = [0u8; CONTROL_EXTRAS_LEN];
        out[0] = self.mode as u8;
        out[4..8].copy_from_slice(&self.value.to_be_bytes());
        out[8..12].copy_from_slice(&self.inject_error.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decode_rejects_short_extras() {
        assert_eq!(
            ControlPayload::decode(&[0u8; 4]),
            Err(ControlPayloadError::BadLength(4))
        );
    }

    #[test]
    fn decode_rejects_unknown_mode() {
        let mut extras = [0u8; CONTROL_EXTRAS_LEN];
        extras[0] = 0x7f;
        assert_eq!(
            ControlPayload::decode(&extras),
            Err(ControlPayloadError::UnknownMode(0x7f))
        );
    }

    #[test]
    fn value_and_error_are_big_endian() {
        let payload = ControlPayload {
            mode: ControlMode::NextN,
            value: 0x0102_0304,
            inject_error: 0x0000_0007,
        };
        let bytes = payload.encode();
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn reserved_and_padding_are_ignored() {
        let mut bytes = ControlPayload {
            mode: ControlMode::Suspend,
            value: 9,
            inject_error: 0,
        }
        .encode();
        bytes[1] = 0xaa;
        bytes[2] = 0xbb;
        bytes[3] = 0xcc;
        let decoded = ControlPayload::decode(&bytes).expect("decode");
        assert_eq!(decoded.mode, ControlMode::Suspend);
        assert_eq!(decoded.value, 9);
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(mode_raw in 0u8..=10, value: u32, inject_error: u32) {
            let mode = ControlMode::from_raw(mode_raw).expect("raw mode in range");
            let payload = ControlPayload { mode, value, inject_error };
            prop_assert_eq!(ControlPayload::decode(&payload.encode()), Ok(payload));
        }
    }
}

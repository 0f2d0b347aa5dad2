//! Codec for the extended-attribute (xattr) section carried at the front of
//! a value whose datatype has the xattr bit set.
//!
//! Layout: a 4-byte big-endian length of the body, then one entry per
//! attribute: a 4-byte big-endian length covering `key NUL value NUL`,
//! followed by exactly those bytes.

use std::fmt;

/// Builds an xattr section front-to-back.
#[derive(Debug, Default)]
pub struct XattrBlob {
    body: Vec<u8>,
}

impl XattrBlob {
    /// Start an empty blob.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one attribute pair.
    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        let entry_len = (key.len() + value.len() + 2) as u32;
        self.body.extend_from_slice(&entry_len.to_be_bytes());
        self.body.extend_from_slice(key.as_bytes());
        self.body.push(0);
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0);
        self
    }

    /// Finish the blob: the length prefix followed by the body.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Reasons an xattr section fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XattrParseError {
    /// The bytes end before a declared length is satisfied.
    Truncated,
    /// An entry is missing its NUL separators.
    MissingSeparator,
}

impl fmt::Display for XattrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("xattr section truncated"),
            Self::MissingSeparator => f.write_str("xattr entry missing NUL separator"),
        }
    }
}

impl std::error::Error for XattrParseError {}

/// Parse an xattr section into `(key, value)` pairs, returning the pairs and
/// the number of bytes the section occupies (prefix included).
pub fn parse(bytes: &[u8]) -> Result<(Vec<(String, String)>, usize), XattrParseError> {
    if bytes.len() < 4 {
        return Err(XattrParseError::Truncated);
    }
    let body_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let total = 4 + body_len;
    if bytes.len() < total {
        return Err(XattrParseError::Truncated);
    }

    let mut pairs = Vec::new();
    let mut pos = 4;
    while pos < total {
        if total - pos < 4 {
            return Err(XattrParseError::Truncated);
        }
        let entry_len =
            u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
                as usize;
        pos += 4;
        if total - pos < entry_len {
            return Err(XattrParseError::Truncated);
        }
        let entry = &bytes[pos..pos + entry_len];
        pos += entry_len;

        let key_end = entry
            .iter()
            .position(|&b| b == 0)
            .ok_or(XattrParseError::MissingSeparator)?;
        let rest = &entry[key_end + 1..];
        let value_end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(XattrParseError::MissingSeparator)?;
        pairs.push((
            String::from_utf8_lossy(&entry[..key_end]).into_owned(),
            String::from_utf8_lossy(&rest[..value_end]).into_owned(),
        ));
    }
    Ok((pairs, total))
}

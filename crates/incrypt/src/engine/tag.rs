//! Ciphertext version tags.

use std::fmt;

/// Tag for plaintext passthrough.
pub const PLAIN_TAG: &str = "pt";

/// Tag for legacy AES-GCM with a hex payload. Decrypt-only.
pub const LEGACY_TAG: &str = "1";

/// Tag for AES-GCM with a base64 payload. Produced by `encrypt`.
pub const CURRENT_TAG: &str = "2";

/// Separator between tag and payload.
pub const SEPARATOR: char = ':';

/// The fixed built-in tags, plus the open slot for custom ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag<'a> {
    /// `pt`
    Plain,
    /// `1`
    Legacy,
    /// `2`
    Current,
    /// Anything else; resolved against the custom encryption registry.
    Other(&'a str),
}

impl<'a> VersionTag<'a> {
    /// Classify a raw tag.
    pub fn parse(tag: &'a str) -> Self {
        match tag {
            PLAIN_TAG => VersionTag::Plain,
            LEGACY_TAG => VersionTag::Legacy,
            CURRENT_TAG => VersionTag::Current,
            other => VersionTag::Other(other),
        }
    }

    /// The tag as it appears in a message.
    pub fn as_str(&self) -> &'a str {
        match self {
            VersionTag::Plain => PLAIN_TAG,
            VersionTag::Legacy => LEGACY_TAG,
            VersionTag::Current => CURRENT_TAG,
            VersionTag::Other(tag) => tag,
        }
    }
}

impl fmt::Display for VersionTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a message into tag and payload.
///
/// A message is exactly two parts; `None` for a missing or extra separator.
pub fn split_message(message: &str) -> Option<(VersionTag<'_>, &str)> {
    let (tag, payload) = message.split_once(SEPARATOR)?;
    if payload.contains(SEPARATOR) {
        return None;
    }
    Some((VersionTag::parse(tag), payload))
}

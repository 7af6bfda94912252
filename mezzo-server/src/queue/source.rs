//! Queue source identities
//!
//! Every outbound unit of work is tagged with the upstream it talks
//! to. Budgets are configured and enforced per source, so a saturated
//! provider never throttles another.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream identity used as a throttling key.
///
/// `Palette` is not a network provider: CPU-bound palette extraction
/// is tagged with its own source so it is admitted independently of
/// network calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Spotify,
    Deezer,
    LastFM,
    Palette,
}

impl Source {
    /// All known sources, in a stable order.
    pub const ALL: [Source; 4] = [
        Source::Spotify,
        Source::Deezer,
        Source::LastFM,
        Source::Palette,
    ];

    /// Configuration key for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Spotify => "spotify",
            Source::Deezer => "deezer",
            Source::LastFM => "lastfm",
            Source::Palette => "palette",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keys_are_lowercase() {
        assert_eq!(Source::LastFM.as_str(), "lastfm");
        assert_eq!(Source::Palette.to_string(), "palette");
    }

    #[test]
    fn serde_roundtrip_matches_config_keys() {
        for source in Source::ALL {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
            let back: Source = serde_json::from_str(&json).unwrap();
            assert_eq!(back, source);
        }
    }
}

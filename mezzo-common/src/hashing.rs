//! Entity hashing
//!
//! Cache and database keys are hex SHA-256 digests of normalized
//! entity names, so the same artist spelled with different casing or
//! spacing resolves to the same row.

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of an arbitrary string.
pub fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase and strip all spaces. Matching is intentionally loose:
/// "Daft Punk" and "daftpunk" are the same artist.
pub fn normalize(input: &str) -> String {
    input.to_lowercase().replace(' ', "")
}

/// Key for an artist entity.
pub fn hash_artist(artist: &str) -> String {
    hash(&normalize(artist))
}

/// Key for an album entity. Albums are only unique per artist.
pub fn hash_album(name: &str, artist: &str) -> String {
    hash(&normalize(&format!("{}:{}", name, artist)))
}

/// Key for a track entity. The album component may be empty.
pub fn hash_track(name: &str, artist: &str, album: &str) -> String {
    hash(&normalize(&format!("{}:{}:{}", name, artist, album)))
}

//! Upstream provider clients
//!
//! One client per provider. Clients are plain HTTP wrappers: no rate
//! limiting (the task queue owns admission) and no retries.

pub mod deezer;
pub mod lastfm;
pub mod spotify;

pub use deezer::{DeezerClient, DeezerError};
pub use lastfm::{LastfmClient, LastfmError};
pub use spotify::{SpotifyClient, SpotifyError};

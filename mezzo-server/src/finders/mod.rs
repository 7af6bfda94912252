//! Metadata finders
//!
//! One finder per entity kind, each walking the same ladder: fast
//! cache, durable store, then the upstream providers through the task
//! queue. Provider failures degrade the result instead of failing the
//! lookup; a finder only returns None when nothing anywhere knows the
//! entity.

pub mod album;
pub mod artist;
pub mod track;

pub use album::find_album;
pub use artist::find_artist;
pub use track::find_track;

use crate::models::Provider;

/// Providers consulted when a request does not name any.
pub const DEFAULT_ARTIST_PROVIDERS: &[Provider] = &[Provider::Spotify, Provider::LastFM];
pub const DEFAULT_ALBUM_PROVIDERS: &[Provider] = &[Provider::Spotify, Provider::Deezer];
pub const DEFAULT_TRACK_PROVIDERS: &[Provider] = &[Provider::Spotify, Provider::Deezer];

//! Redis fast-cache tier
//!
//! Entities are stored as JSON under prefixed keys with per-kind TTLs.
//! Besides positive entries the cache holds negative markers: when a
//! provider has nothing for an entity, that miss is remembered so the
//! provider is not re-queried until the marker expires.

use mezzo_common::config::ExpirationConfig;
use mezzo_common::{Error, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Entity kinds stored in the fast cache, used as key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Artist => "AR",
            EntityKind::Album => "AL",
            EntityKind::Track => "TR",
        }
    }
}

/// Fast-cache client over a shared redis connection.
#[derive(Clone)]
pub struct CacheClient {
    conn: ConnectionManager,
    expiration: ExpirationConfig,
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl CacheClient {
    pub async fn connect(url: &str, expiration: ExpirationConfig) -> Result<Self> {
        info!("Connecting to redis cache at {}", url);

        let client = redis::Client::open(url)
            .map_err(|e| Error::Cache(format!("Failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(format!("Failed to connect to redis: {e}")))?;

        info!("Connected to redis cache");

        Ok(Self { conn, expiration })
    }

    fn entity_key(kind: EntityKind, hash: &str) -> String {
        format!("{}:{}", kind.prefix(), hash)
    }

    fn not_found_key(hash: &str, provider: &str) -> String {
        format!("{}:{}::nf", provider, hash)
    }

    fn popularity_key(spotify_id: &str) -> String {
        format!("{}:spotify-popularity", spotify_id)
    }

    fn features_key(spotify_id: &str) -> String {
        format!("{}:features", spotify_id)
    }

    fn entity_ttl(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Artist => self.expiration.artists,
            EntityKind::Album => self.expiration.albums,
            EntityKind::Track => self.expiration.tracks,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| Error::Cache(format!("Redis GET failed: {e}")))?;

        match data {
            Some(json) => {
                debug!("Cache HIT: {}", key);
                let value = serde_json::from_str(&json)
                    .map_err(|e| Error::Cache(format!("Failed to decode cache entry: {e}")))?;
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: u64) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| Error::Cache(format!("Failed to encode cache entry: {e}")))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl)
            .await
            .map_err(|e| Error::Cache(format!("Redis SETEX failed: {e}")))?;

        Ok(())
    }

    /// Fetch a cached entity.
    pub async fn get_entity<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        hash: &str,
    ) -> Result<Option<T>> {
        self.get_json(&Self::entity_key(kind, hash)).await
    }

    /// Store an entity with its kind's TTL.
    pub async fn set_entity<T: Serialize>(
        &self,
        kind: EntityKind,
        hash: &str,
        value: &T,
    ) -> Result<()> {
        self.set_json(&Self::entity_key(kind, hash), value, self.entity_ttl(kind))
            .await
    }

    /// Remember that a provider had nothing for this entity.
    pub async fn mark_not_found(&self, hash: &str, provider: &str) -> Result<()> {
        debug!(provider, hash, "Marking entity as not found");
        self.set_json(
            &Self::not_found_key(hash, provider),
            &true,
            self.expiration.not_found,
        )
        .await
    }

    /// Whether a provider was recently recorded as having nothing for
    /// this entity.
    pub async fn is_not_found(&self, hash: &str, provider: &str) -> Result<bool> {
        let marker: Option<bool> = self.get_json(&Self::not_found_key(hash, provider)).await?;
        Ok(marker.unwrap_or(false))
    }

    /// Store spotify popularity for an artist id.
    pub async fn set_popularity(&self, spotify_id: &str, value: u32) -> Result<()> {
        self.set_json(
            &Self::popularity_key(spotify_id),
            &value,
            self.expiration.popularity,
        )
        .await
    }

    pub async fn get_popularity(&self, spotify_id: &str) -> Result<Option<u32>> {
        self.get_json(&Self::popularity_key(spotify_id)).await
    }

    /// Store audio features for a spotify track id, sharing the track
    /// TTL.
    pub async fn set_features(
        &self,
        spotify_id: &str,
        features: &crate::models::TrackFeatures,
    ) -> Result<()> {
        self.set_json(
            &Self::features_key(spotify_id),
            features,
            self.expiration.tracks,
        )
        .await
    }

    pub async fn get_features(
        &self,
        spotify_id: &str,
    ) -> Result<Option<crate::models::TrackFeatures>> {
        self.get_json(&Self::features_key(spotify_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        // Existing deployments have data under these keys.
        assert_eq!(CacheClient::entity_key(EntityKind::Artist, "abc"), "AR:abc");
        assert_eq!(CacheClient::entity_key(EntityKind::Album, "abc"), "AL:abc");
        assert_eq!(CacheClient::entity_key(EntityKind::Track, "abc"), "TR:abc");
        assert_eq!(
            CacheClient::not_found_key("abc", "spotify"),
            "spotify:abc::nf"
        );
        assert_eq!(
            CacheClient::popularity_key("id1"),
            "id1:spotify-popularity"
        );
    }
}

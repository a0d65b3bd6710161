//! The seam between views and the remote vault.
//!
//! Views only talk to the backend through this trait so they can be driven
//! by an in-memory fake in tests.

use std::collections::HashSet;

use async_trait::async_trait;
use vault_proto::protocol::{PlaylistSettings, TrackQuery};
use vault_proto::track::{Track, TrackId, TrackMetadata};

use crate::error::ApiError;

#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Tracks newest-created first, optionally filtered and truncated.
    async fn list_tracks(&self, query: TrackQuery) -> Result<Vec<Track>, ApiError>;

    /// Seal a new track.
    async fn create_track(&self, metadata: &TrackMetadata) -> Result<Track, ApiError>;

    async fn delete_track(&self, id: TrackId) -> Result<(), ApiError>;

    /// Make a pending track available before its period ends.
    async fn unlock_track(&self, id: TrackId) -> Result<Track, ApiError>;

    /// Which of `spotify_ids` are already in the vault.
    async fn check_tracks(&self, spotify_ids: &[String]) -> Result<HashSet<String>, ApiError>;

    async fn search(&self, query: &str) -> Result<Vec<TrackMetadata>, ApiError>;

    /// `None` when no target playlist has been chosen.
    async fn playlist_settings(&self) -> Result<Option<PlaylistSettings>, ApiError>;

    async fn add_to_playlist(
        &self,
        playlist_id: &str,
        spotify_ids: &[String],
    ) -> Result<(), ApiError>;

    async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        spotify_ids: &[String],
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory backend recording every call.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, Utc};
    use vault_proto::track::TrackStatus;

    #[derive(Default)]
    pub struct FakeBackend {
        pub tracks: Mutex<Vec<Track>>,
        pub playlist: Mutex<Option<PlaylistSettings>>,
        pub playlist_tracks: Mutex<Vec<String>>,
        pub catalog: Mutex<Vec<TrackMetadata>>,
        pub calls: Mutex<Vec<String>>,
        pub fail_add: AtomicBool,
        pub fail_remove: AtomicBool,
        pub fail_list: AtomicBool,
    }

    impl FakeBackend {
        pub fn with_tracks(tracks: Vec<Track>) -> Self {
            let fake = Self::default();
            *fake.tracks.lock().unwrap() = tracks;
            *fake.playlist.lock().unwrap() = Some(PlaylistSettings {
                playlist_id: "pl1".to_string(),
                playlist_name: "Unearthed".to_string(),
            });
            fake
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn server_error() -> ApiError {
            ApiError::Status {
                status: 500,
                detail: "boom".to_string(),
            }
        }
    }

    /// A track that became available at `available_at`, 30 days after sealing.
    pub fn ready(id: TrackId, title: &str, available_at: DateTime<Utc>) -> Track {
        let locked_at = available_at - Duration::days(30);
        Track {
            id,
            metadata: TrackMetadata {
                spotify_id: format!("sp{}", id),
                title: title.to_string(),
                artist: "Artist".to_string(),
                album: "Album".to_string(),
                image_url: None,
                release_date: "2020-01-01".to_string(),
                preview_url: None,
            },
            status: TrackStatus::Available,
            locked_at: Some(locked_at),
            available_at: Some(available_at),
            revealed_at: None,
            created_at: locked_at,
            played_at: None,
        }
    }

    pub fn sealed(id: TrackId, title: &str, available_at: DateTime<Utc>) -> Track {
        Track {
            status: TrackStatus::Pending,
            ..ready(id, title, available_at)
        }
    }

    #[async_trait]
    impl VaultBackend for FakeBackend {
        async fn list_tracks(&self, query: TrackQuery) -> Result<Vec<Track>, ApiError> {
            self.record("list".to_string());
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let mut tracks: Vec<Track> = self
                .tracks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| query.status.map_or(true, |s| t.status == s))
                .cloned()
                .collect();
            if let Some(limit) = query.limit {
                tracks.truncate(limit);
            }
            Ok(tracks)
        }

        async fn create_track(&self, metadata: &TrackMetadata) -> Result<Track, ApiError> {
            self.record(format!("create:{}", metadata.spotify_id));
            let mut tracks = self.tracks.lock().unwrap();
            if tracks.iter().any(|t| t.metadata.spotify_id == metadata.spotify_id) {
                return Err(ApiError::Conflict(crate::error::DUPLICATE_TRACK.to_string()));
            }
            let now = Utc::now();
            let track = Track {
                id: tracks.len() as TrackId + 100,
                metadata: metadata.clone(),
                status: TrackStatus::Pending,
                locked_at: Some(now),
                available_at: Some(now + Duration::days(30)),
                revealed_at: None,
                created_at: now,
                played_at: None,
            };
            tracks.insert(0, track.clone());
            Ok(track)
        }

        async fn delete_track(&self, id: TrackId) -> Result<(), ApiError> {
            self.record(format!("delete:{}", id));
            let mut tracks = self.tracks.lock().unwrap();
            let before = tracks.len();
            tracks.retain(|t| t.id != id);
            if tracks.len() == before {
                return Err(ApiError::NotFound);
            }
            Ok(())
        }

        async fn unlock_track(&self, id: TrackId) -> Result<Track, ApiError> {
            self.record(format!("unlock:{}", id));
            let mut tracks = self.tracks.lock().unwrap();
            let track = tracks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(ApiError::NotFound)?;
            if track.status != TrackStatus::Pending {
                return Err(ApiError::Validation("Track is not locked".to_string()));
            }
            track.status = TrackStatus::Available;
            track.available_at = Some(Utc::now());
            Ok(track.clone())
        }

        async fn check_tracks(&self, spotify_ids: &[String]) -> Result<HashSet<String>, ApiError> {
            self.record("check".to_string());
            let tracks = self.tracks.lock().unwrap();
            Ok(spotify_ids
                .iter()
                .filter(|id| tracks.iter().any(|t| &t.metadata.spotify_id == *id))
                .cloned()
                .collect())
        }

        async fn search(&self, query: &str) -> Result<Vec<TrackMetadata>, ApiError> {
            self.record(format!("search:{}", query));
            let needle = query.to_lowercase();
            Ok(self
                .catalog
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.title.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }

        async fn playlist_settings(&self) -> Result<Option<PlaylistSettings>, ApiError> {
            Ok(self.playlist.lock().unwrap().clone())
        }

        async fn add_to_playlist(
            &self,
            playlist_id: &str,
            spotify_ids: &[String],
        ) -> Result<(), ApiError> {
            self.record(format!("add:{}:{}", playlist_id, spotify_ids.join(",")));
            if self.fail_add.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            self.playlist_tracks.lock().unwrap().extend(spotify_ids.iter().cloned());
            let now = Utc::now();
            for track in self.tracks.lock().unwrap().iter_mut() {
                if spotify_ids.contains(&track.metadata.spotify_id) {
                    track.status = TrackStatus::Revealed;
                    track.revealed_at = Some(now);
                }
            }
            Ok(())
        }

        async fn remove_from_playlist(
            &self,
            playlist_id: &str,
            spotify_ids: &[String],
        ) -> Result<(), ApiError> {
            self.record(format!("remove:{}:{}", playlist_id, spotify_ids.join(",")));
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            self.playlist_tracks
                .lock()
                .unwrap()
                .retain(|id| !spotify_ids.contains(id));
            Ok(())
        }
    }
}

//! Request and response bodies of the backend REST API.
//!
//! Every response is decoded into one of these types; anything that does
//! not fit is rejected at the HTTP boundary rather than passed along as
//! loose JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::{TrackMetadata, TrackStatus};

/// Query for `GET /api/tracks/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackQuery {
    pub limit: Option<usize>,
    pub status: Option<TrackStatus>,
}

impl TrackQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: TrackStatus, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            status: Some(status),
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        params
    }
}

/// Response of `GET /api/tracks/check/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub locked_ids: Vec<String>,
}

/// Response of `GET /api/auth/csrf/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfResponse {
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub spotify_connected: bool,
}

/// Response of `POST /api/auth/login/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
}

/// Response of `GET /api/spotify/status/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyStatus {
    pub connected: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response of `GET /api/spotify/auth/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUrl {
    pub auth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistTracks {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub tracks: Option<PlaylistTracks>,
}

/// Spotify paging object, passed through by `GET /api/spotify/playlists/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistPage {
    pub items: Vec<Playlist>,
    #[serde(default)]
    pub total: u32,
}

/// Target playlist for unearthed tracks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistSettings {
    pub playlist_id: String,
    pub playlist_name: String,
}

/// Body of the add/remove playlist track calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistTracksBody {
    pub track_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub metadata: TrackMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItems {
    pub items: Vec<SearchItem>,
}

/// Response of `GET /api/spotify/search/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub tracks: SearchItems,
}

/// Best-effort human message from an error body.
///
/// The backend answers either `{"detail": "..."}`, a bare list of messages,
/// or a field map such as `{"non_field_errors": ["..."]}`.
pub fn error_detail(body: &serde_json::Value) -> Option<String> {
    match body {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(error_detail),
        serde_json::Value::Object(map) => {
            if let Some(detail) = map.get("detail").and_then(error_detail) {
                return Some(detail);
            }
            map.values().find_map(error_detail)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params() {
        assert!(TrackQuery::all().to_params().is_empty());
        assert_eq!(
            TrackQuery::with_status(TrackStatus::Available, 5).to_params(),
            vec![("limit", "5".to_string()), ("status", "available".to_string())]
        );
    }

    #[test]
    fn test_error_detail_shapes() {
        assert_eq!(
            error_detail(&json!({"detail": "Track is not available"})).as_deref(),
            Some("Track is not available")
        );
        assert_eq!(
            error_detail(&json!(["failed to create track: boom"])).as_deref(),
            Some("failed to create track: boom")
        );
        let unique = json!({
            "non_field_errors": ["The fields user, metadata must make a unique set."]
        });
        assert_eq!(
            error_detail(&unique).as_deref(),
            Some("The fields user, metadata must make a unique set.")
        );
        assert_eq!(error_detail(&json!({})), None);
    }

    #[test]
    fn test_search_response_shape() {
        let body = json!({
            "tracks": {"items": [{
                "id": 0,
                "metadata": {
                    "spotify_id": "abc",
                    "title": "Windowlicker",
                    "artist": "Aphex Twin",
                    "album": "Windowlicker",
                    "image_url": "/placeholder-album.jpg",
                    "preview_url": null,
                    "release_date": "1999-03-22"
                },
                "status": "active"
            }]}
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.tracks.items[0].metadata.spotify_id, "abc");
    }

    #[test]
    fn test_playlist_page_tolerates_missing_images() {
        let page: PlaylistPage = serde_json::from_value(json!({
            "items": [{"id": "p1", "name": "vault", "images": null}],
            "total": 1
        }))
        .unwrap();
        assert_eq!(page.items[0].name, "vault");
        assert_eq!(page.items[0].images, None);
    }
}

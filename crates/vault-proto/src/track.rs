//! Track entity model: the shared vocabulary of every other module.
//!
//! A `Track` can only be built from a backend record through
//! `TryFrom<TrackRecord>`, which checks the lifecycle invariants:
//!
//! ```text
//!  active     no lifecycle timestamps (pre-seal, never produced by the lifecycle)
//!  pending    locked_at set, revealed_at unset
//!  available  locked_at set, revealed_at unset
//!  revealed   revealed_at set
//!
//!  locked_at <= available_at, locked_at <= revealed_at
//! ```
//!
//! `available_at` may be later than `revealed_at`: that is a track that was
//! unlocked early and then unearthed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TrackId = i64;

/// Lifecycle state of a track.
///
/// Transitions: `Pending -> Available -> Revealed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    /// Being added. Exists in the backend type, unused by the lifecycle.
    Active,
    /// Sealed in the vault, maturing.
    Pending,
    /// Ready to be unearthed.
    Available,
    /// Unearthed into the playlist.
    Revealed,
}

impl TrackStatus {
    /// Wire value, as used in the `status` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Active => "active",
            TrackStatus::Pending => "pending",
            TrackStatus::Available => "available",
            TrackStatus::Revealed => "revealed",
        }
    }

    /// User-facing badge.
    pub fn label(&self) -> &'static str {
        match self {
            TrackStatus::Active => "adding",
            TrackStatus::Pending => "sealed",
            TrackStatus::Available => "ready",
            TrackStatus::Revealed => "unearthed",
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive data copied from Spotify when the track is sealed.
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackMetadata {
    pub spotify_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// `YYYY-MM-DD`, possibly blank or year-only.
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl TrackMetadata {
    /// "Title - Artist", for notifications and logs.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

/// A track exactly as the backend serializes it. Unvalidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub metadata: TrackMetadata,
    pub status: TrackStatus,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revealed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
}

/// A validated track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrackRecord", into = "TrackRecord")]
pub struct Track {
    pub id: TrackId,
    pub metadata: TrackMetadata,
    pub status: TrackStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub available_at: Option<DateTime<Utc>>,
    pub revealed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub played_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("track {id}: spotify_id is empty")]
    MissingSpotifyId { id: TrackId },
    #[error("track {id}: {status} track has no {field}")]
    MissingTimestamp {
        id: TrackId,
        status: TrackStatus,
        field: &'static str,
    },
    #[error("track {id}: active track already has {field}")]
    UnexpectedTimestamp { id: TrackId, field: &'static str },
    #[error("track {id}: {status} track already has revealed_at")]
    RevealedTooEarly { id: TrackId, status: TrackStatus },
    #[error("track {id}: {later} is before {earlier}")]
    OutOfOrder {
        id: TrackId,
        earlier: &'static str,
        later: &'static str,
    },
}

impl TryFrom<TrackRecord> for Track {
    type Error = TrackError;

    fn try_from(raw: TrackRecord) -> Result<Self, Self::Error> {
        let id = raw.id;
        if raw.metadata.spotify_id.trim().is_empty() {
            return Err(TrackError::MissingSpotifyId { id });
        }

        let missing = |field| TrackError::MissingTimestamp {
            id,
            status: raw.status,
            field,
        };
        match raw.status {
            TrackStatus::Active => {
                let stamped = [
                    ("locked_at", raw.locked_at.is_some()),
                    ("available_at", raw.available_at.is_some()),
                    ("revealed_at", raw.revealed_at.is_some()),
                ];
                if let Some((field, _)) = stamped.into_iter().find(|(_, set)| *set) {
                    return Err(TrackError::UnexpectedTimestamp { id, field });
                }
            }
            TrackStatus::Pending | TrackStatus::Available => {
                if raw.locked_at.is_none() {
                    return Err(missing("locked_at"));
                }
                if raw.revealed_at.is_some() {
                    return Err(TrackError::RevealedTooEarly {
                        id,
                        status: raw.status,
                    });
                }
            }
            TrackStatus::Revealed => {
                if raw.revealed_at.is_none() {
                    return Err(missing("revealed_at"));
                }
            }
        }

        if let Some(locked) = raw.locked_at {
            if raw.available_at.is_some_and(|at| at < locked) {
                return Err(TrackError::OutOfOrder {
                    id,
                    earlier: "locked_at",
                    later: "available_at",
                });
            }
            if raw.revealed_at.is_some_and(|at| at < locked) {
                return Err(TrackError::OutOfOrder {
                    id,
                    earlier: "locked_at",
                    later: "revealed_at",
                });
            }
        }

        Ok(Track {
            id,
            metadata: raw.metadata,
            status: raw.status,
            locked_at: raw.locked_at,
            available_at: raw.available_at,
            revealed_at: raw.revealed_at,
            created_at: raw.created_at,
            played_at: raw.played_at,
        })
    }
}

impl From<Track> for TrackRecord {
    fn from(track: Track) -> Self {
        TrackRecord {
            id: track.id,
            metadata: track.metadata,
            status: track.status,
            locked_at: track.locked_at,
            available_at: track.available_at,
            revealed_at: track.revealed_at,
            created_at: track.created_at,
            played_at: track.played_at,
        }
    }
}

impl AsRef<Track> for Track {
    fn as_ref(&self) -> &Track {
        self
    }
}

impl Track {
    /// Timestamp used for sorting, date filters and grouping: when the
    /// track was sealed, or `now` for tracks that never were.
    pub fn sealed_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.locked_at.unwrap_or(now)
    }
}

/// Validate a list of records, dropping (and logging) the ones that break
/// the lifecycle invariants.
pub fn validate_records(records: Vec<TrackRecord>) -> Vec<Track> {
    records
        .into_iter()
        .filter_map(|raw| match Track::try_from(raw) {
            Ok(track) => Some(track),
            Err(e) => {
                tracing::warn!("dropping invalid track record: {}", e);
                None
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(status: TrackStatus) -> TrackRecord {
        sealed(7, "Song", t0()).into_record_with(status)
    }

    impl Track {
        fn into_record_with(self, status: TrackStatus) -> TrackRecord {
            let mut raw = TrackRecord::from(self);
            raw.status = status;
            raw
        }
    }

    #[test]
    fn test_parse_backend_json() {
        let json = r#"{
            "id": 12,
            "metadata": {
                "spotify_id": "4uLU6hMCjMI75M1A2tKUQC",
                "title": "Never Gonna Give You Up",
                "artist": "Rick Astley",
                "album": "Whenever You Need Somebody",
                "preview_url": null,
                "image_url": "https://i.scdn.co/image/x",
                "release_date": "1987-11-12"
            },
            "status": "pending",
            "locked_at": "2024-03-01T12:00:00.123456Z",
            "available_at": "2024-03-31T12:00:00.123456Z",
            "revealed_at": null,
            "created_at": "2024-03-01T12:00:00.120000Z",
            "played_at": null
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.id, 12);
        assert_eq!(track.status, TrackStatus::Pending);
        assert_eq!(track.metadata.spotify_id, "4uLU6hMCjMI75M1A2tKUQC");
        assert!(track.available_at.unwrap() > track.locked_at.unwrap());
    }

    #[test]
    fn test_pending_requires_locked_at() {
        let mut raw = record(TrackStatus::Pending);
        raw.locked_at = None;
        assert_eq!(
            Track::try_from(raw).unwrap_err(),
            TrackError::MissingTimestamp {
                id: 7,
                status: TrackStatus::Pending,
                field: "locked_at"
            }
        );
    }

    #[test]
    fn test_pending_rejects_revealed_at() {
        let mut raw = record(TrackStatus::Pending);
        raw.revealed_at = Some(t0() + Duration::days(40));
        assert!(matches!(
            Track::try_from(raw),
            Err(TrackError::RevealedTooEarly { .. })
        ));
    }

    #[test]
    fn test_revealed_requires_revealed_at() {
        let raw = record(TrackStatus::Revealed);
        assert!(matches!(
            Track::try_from(raw),
            Err(TrackError::MissingTimestamp {
                field: "revealed_at",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_available_before_locked() {
        let mut raw = record(TrackStatus::Pending);
        raw.available_at = Some(t0() - Duration::seconds(1));
        assert_eq!(
            Track::try_from(raw).unwrap_err(),
            TrackError::OutOfOrder {
                id: 7,
                earlier: "locked_at",
                later: "available_at"
            }
        );
    }

    #[test]
    fn test_early_unlock_then_reveal_is_accepted() {
        let mut raw = record(TrackStatus::Revealed);
        raw.revealed_at = Some(t0() + Duration::days(2));
        let track = Track::try_from(raw).unwrap();
        assert!(track.revealed_at < track.available_at);
    }

    #[test]
    fn test_active_needs_no_timestamps() {
        let mut raw = record(TrackStatus::Active);
        raw.locked_at = None;
        raw.available_at = None;
        assert!(Track::try_from(raw).is_ok());
    }

    #[test]
    fn test_active_rejects_lifecycle_timestamps() {
        let mut raw = record(TrackStatus::Active);
        raw.available_at = None;
        assert_eq!(
            Track::try_from(raw.clone()).unwrap_err(),
            TrackError::UnexpectedTimestamp {
                id: 7,
                field: "locked_at"
            }
        );

        raw.locked_at = None;
        raw.revealed_at = Some(t0());
        assert!(matches!(
            Track::try_from(raw),
            Err(TrackError::UnexpectedTimestamp {
                field: "revealed_at",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_records_drops_invalid() {
        let good = record(TrackStatus::Pending);
        let mut bad = record(TrackStatus::Pending);
        bad.id = 8;
        bad.metadata.spotify_id = " ".to_string();
        let tracks = validate_records(vec![good, bad]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, 7);
    }

    #[test]
    fn test_unknown_status_is_a_parse_error() {
        let mut value = serde_json::to_value(sealed(1, "x", t0())).unwrap();
        value["status"] = serde_json::json!("buried");
        assert!(serde_json::from_value::<Track>(value).is_err());
    }
}

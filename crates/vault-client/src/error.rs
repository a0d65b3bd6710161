//! Error taxonomy shared by the API client and the views.

use vault_proto::protocol::error_detail;
use vault_proto::track::TrackId;

/// User-facing message for a duplicate seal.
pub const DUPLICATE_TRACK: &str = "track already exists in your vault";

/// Broad class of a failure, used to pick the notification wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure or an unexpected server error.
    Network,
    /// The request was understood but refused (duplicate, bad state).
    Conflict,
    /// Not signed in, or the Spotify account is not connected.
    Authorization,
    /// The response did not match the expected schema.
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("not signed in")]
    Unauthorized,

    #[error("spotify not connected")]
    SpotifyNotConnected,

    #[error("not found")]
    NotFound,

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) | ApiError::Status { .. } => ErrorKind::Network,
            ApiError::Conflict(_) | ApiError::Validation(_) | ApiError::NotFound => {
                ErrorKind::Conflict
            }
            ApiError::Unauthorized | ApiError::SpotifyNotConnected => ErrorKind::Authorization,
            ApiError::Malformed { .. } => ErrorKind::Malformed,
        }
    }

    pub fn malformed(endpoint: &str, reason: impl ToString) -> Self {
        ApiError::Malformed {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map a non-success response to an error.
    pub fn from_response(status: u16, body: &str) -> Self {
        let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let detail = json
            .as_ref()
            .and_then(error_detail)
            .unwrap_or_else(|| body.trim().to_string());

        if is_duplicate(&detail) || is_duplicate(body) {
            return ApiError::Conflict(DUPLICATE_TRACK.to_string());
        }

        match status {
            401 => ApiError::Unauthorized,
            403 if detail.to_lowercase().contains("spotify not connected") => {
                ApiError::SpotifyNotConnected
            }
            403 => ApiError::Unauthorized,
            404 => ApiError::NotFound,
            400 if detail.is_empty() => ApiError::Validation("request rejected".to_string()),
            400 => ApiError::Validation(detail),
            _ => ApiError::Status { status, detail },
        }
    }
}

fn is_duplicate(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("already exists")
        || lower.contains("unique constraint")
        || lower.contains("must make a unique set")
}

/// Failure of a user action on a view.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("please select a playlist in settings first")]
    NoPlaylist,

    #[error("track {0} is not in this view")]
    UnknownTrack(TrackId),

    #[error("track {0} is not ready to be unearthed")]
    NotReady(TrackId),

    #[error("track {0} is not sealed")]
    NotSealed(TrackId),
}

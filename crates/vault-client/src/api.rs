//! HTTP client for the vault backend.
//!
//! Every response is decoded into a typed schema from `vault_proto`; a body
//! that does not fit is a [`ApiError::Malformed`], never a partially filled
//! value. Session and csrf cookies are carried by hand so they can be
//! persisted between CLI runs.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use vault_proto::config::Config;
use vault_proto::protocol::{
    AuthUrl, CheckResponse, Credentials, CsrfResponse, LoginResponse, Playlist, PlaylistPage,
    PlaylistSettings, PlaylistTracksBody, SearchResponse, SpotifyStatus, TrackQuery, User,
};
use vault_proto::track::{validate_records, Track, TrackId, TrackMetadata, TrackRecord};

use crate::backend::VaultBackend;
use crate::error::ApiError;
use crate::session::Session;

const CSRF_HEADER: &str = "X-CSRFToken";

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Mutex<Session>,
    session_file: Option<PathBuf>,
}

impl ApiClient {
    /// A client with an in-memory session only.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cache-vault/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Mutex::new(Session::default()),
            session_file: None,
        })
    }

    /// A client whose session is loaded from and saved to the configured file.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let mut client = Self::new(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?;
        let path = config.paths.session_file.clone();
        client.session = Mutex::new(Session::load(&path));
        client.session_file = Some(path);
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock_session().is_signed_in()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── transport ─────────────────────────────────────────────────────────────

    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .header("Accept", "application/json")
            .header(REFERER, format!("{}/", self.base_url));
        let cookies = self.lock_session().cookie_header();
        if let Some(cookies) = cookies {
            request = request.header(COOKIE, cookies);
        }

        debug!("{} {}", method, path);
        let response = build(request).send().await?;
        self.absorb_cookies(&response).await;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        warn!("{} {} failed: {}", method, path, err);
        Err(err)
    }

    async fn absorb_cookies(&self, response: &Response) {
        let changed = {
            let mut session = self.lock_session();
            let mut changed = false;
            for value in response.headers().get_all(SET_COOKIE) {
                if let Ok(header) = value.to_str() {
                    changed |= session.apply_set_cookie(header);
                }
            }
            changed
        };
        if changed {
            self.persist_session().await;
        }
    }

    async fn persist_session(&self) {
        let Some(path) = &self.session_file else {
            return;
        };
        let snapshot = self.lock_session().clone();
        if let Err(e) = snapshot.save(path).await {
            warn!("failed to persist session: {}", e);
        }
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::malformed(path, e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, |req| req.query(params)).await?;
        Self::decode(path, response).await
    }

    /// An unsafe-method request carrying a freshly fetched csrf token.
    async fn mutate<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let token = self.csrf_token().await?;
        self.send(method, path, |req| {
            let req = req.header(CSRF_HEADER, token);
            match body {
                Some(body) => req.json(body),
                None => req,
            }
        })
        .await
    }

    // ── auth ──────────────────────────────────────────────────────────────────

    pub async fn csrf_token(&self) -> Result<String, ApiError> {
        let path = "/api/auth/csrf/";
        let response = self.send(Method::GET, path, |req| req).await?;
        let csrf: CsrfResponse = Self::decode(path, response).await?;
        Ok(csrf.csrf_token)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let path = "/api/auth/login/";
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.mutate(Method::POST, path, Some(&credentials)).await?;
        let login: LoginResponse = Self::decode(path, response).await?;
        info!("signed in as {}", login.user.username);
        Ok(login.user)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.mutate::<()>(Method::POST, "/api/auth/logout/", None).await;
        self.lock_session().clear();
        self.persist_session().await;
        result.map(|_| ())
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("/api/auth/user/", &[]).await
    }

    // ── tracks ────────────────────────────────────────────────────────────────

    async fn track_action(&self, id: TrackId, action: &str) -> Result<Track, ApiError> {
        let path = format!("/api/tracks/{}/{}/", id, action);
        let response = self.mutate::<()>(Method::POST, &path, None).await?;
        Self::decode(&path, response).await
    }

    pub async fn lock_track(&self, id: TrackId) -> Result<Track, ApiError> {
        self.track_action(id, "lock").await
    }

    pub async fn reveal_track(&self, id: TrackId) -> Result<Track, ApiError> {
        self.track_action(id, "reveal").await
    }

    // ── spotify ───────────────────────────────────────────────────────────────

    pub async fn spotify_status(&self) -> Result<SpotifyStatus, ApiError> {
        self.get_json("/api/spotify/status/", &[]).await
    }

    pub async fn spotify_auth_url(&self) -> Result<String, ApiError> {
        let auth: AuthUrl = self.get_json("/api/spotify/auth/", &[]).await?;
        Ok(auth.auth_url)
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>, ApiError> {
        let page: PlaylistPage = self.get_json("/api/spotify/playlists/", &[]).await?;
        Ok(page.items)
    }

    pub async fn update_playlist_settings(
        &self,
        settings: &PlaylistSettings,
    ) -> Result<(), ApiError> {
        self.mutate(Method::POST, "/api/spotify/playlist-settings/", Some(settings))
            .await?;
        info!("target playlist set to {}", settings.playlist_name);
        Ok(())
    }

    pub async fn disconnect_spotify(&self) -> Result<(), ApiError> {
        self.mutate::<()>(Method::DELETE, "/api/spotify/disconnect/", None)
            .await?;
        Ok(())
    }

    async fn playlist_tracks(
        &self,
        method: Method,
        playlist_id: &str,
        spotify_ids: &[String],
    ) -> Result<(), ApiError> {
        let path = format!("/api/spotify/playlists/{}/tracks/", playlist_id);
        let body = PlaylistTracksBody {
            track_ids: spotify_ids.to_vec(),
        };
        self.mutate(method, &path, Some(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl VaultBackend for ApiClient {
    async fn list_tracks(&self, query: TrackQuery) -> Result<Vec<Track>, ApiError> {
        let records: Vec<TrackRecord> = self.get_json("/api/tracks/", &query.to_params()).await?;
        let mut tracks = validate_records(records);
        if let Some(limit) = query.limit {
            tracks.truncate(limit);
        }
        Ok(tracks)
    }

    async fn create_track(&self, metadata: &TrackMetadata) -> Result<Track, ApiError> {
        let path = "/api/tracks/";
        let response = self.mutate(Method::POST, path, Some(metadata)).await?;
        let track: Track = Self::decode(path, response).await?;
        info!("sealed {} as track {}", metadata.display_name(), track.id);
        Ok(track)
    }

    async fn delete_track(&self, id: TrackId) -> Result<(), ApiError> {
        self.mutate::<()>(Method::DELETE, &format!("/api/tracks/{}/", id), None)
            .await?;
        Ok(())
    }

    async fn unlock_track(&self, id: TrackId) -> Result<Track, ApiError> {
        self.track_action(id, "unlock").await
    }

    async fn check_tracks(&self, spotify_ids: &[String]) -> Result<HashSet<String>, ApiError> {
        if spotify_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let params = [("spotify_ids", spotify_ids.join(","))];
        let check: CheckResponse = self.get_json("/api/tracks/check/", &params).await?;
        Ok(check.locked_ids.into_iter().collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<TrackMetadata>, ApiError> {
        let params = [("q", query.to_string())];
        let response: SearchResponse = self.get_json("/api/spotify/search/", &params).await?;
        Ok(response
            .tracks
            .items
            .into_iter()
            .map(|item| item.metadata)
            .collect())
    }

    async fn playlist_settings(&self) -> Result<Option<PlaylistSettings>, ApiError> {
        match self.get_json("/api/spotify/playlist-settings/", &[]).await {
            Ok(settings) => Ok(Some(settings)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_to_playlist(
        &self,
        playlist_id: &str,
        spotify_ids: &[String],
    ) -> Result<(), ApiError> {
        self.playlist_tracks(Method::POST, playlist_id, spotify_ids).await
    }

    async fn remove_from_playlist(
        &self,
        playlist_id: &str,
        spotify_ids: &[String],
    ) -> Result<(), ApiError> {
        self.playlist_tracks(Method::DELETE, playlist_id, spotify_ids).await
    }
}

/// VaultView: one mounted track list and everything it owns.
///
/// A view holds its fetched tracks, the undo slot for its last unearth, its
/// notifications and the target playlist. Nothing else mutates them: when
/// mounted with [`VaultView::run`] the view becomes a single task fed by
/// `ViewCommand`s, the lifecycle clock interval, the undo wake-up and the
/// update bus.
///
/// Mutations follow one rule: call the backend first and change local state
/// only once it has confirmed, then publish on the bus so sibling views
/// refetch.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vault_proto::clock;
use vault_proto::config::Config;
use vault_proto::projection::{group_by_period, status_counts, Period, Projection, StatusCounts};
use vault_proto::protocol::{PlaylistSettings, TrackQuery};
use vault_proto::track::{Track, TrackId, TrackStatus};

use crate::backend::VaultBackend;
use crate::bus::UpdateBus;
use crate::error::{ActionError, ApiError, ErrorKind};
use crate::toast::{Toast, ToastManager};
use crate::undo::{ArmedUndo, UndoController, UndoPhase, UndoState, UndoTiming};

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of wall-clock time for the lifecycle clock.
pub type WallClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ── ViewCommand ───────────────────────────────────────────────────────────────

/// All user inputs into a mounted view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    Reload,
    Unearth(TrackId),
    Undo,
    Delete(TrackId),
    UnlockEarly(TrackId),
    SetProjection(Projection),
    Shutdown,
}

// ── Rows ──────────────────────────────────────────────────────────────────────

/// A rendered entry. `undo` is set on the placeholder of the armed track.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub track: Track,
    pub undo: Option<UndoPhase>,
}

impl AsRef<Track> for Row {
    fn as_ref(&self) -> &Track {
        &self.track
    }
}

/// What a mounted view publishes after every event.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    pub rows: Vec<Row>,
    pub counts: StatusCounts,
    pub undo: UndoPhase,
    pub notices: Vec<Toast>,
    pub playlist: Option<PlaylistSettings>,
    pub loaded: bool,
}

// ── VaultView ─────────────────────────────────────────────────────────────────

pub struct VaultView {
    backend: Arc<dyn VaultBackend>,
    bus: UpdateBus,
    query: TrackQuery,
    /// `None` keeps the backend order (the ready widget).
    projection: Option<Projection>,
    poll_interval: Duration,
    clock: WallClock,
    tracks: Vec<Track>,
    playlist: Option<PlaylistSettings>,
    undo: UndoController,
    toasts: ToastManager,
    loaded: bool,
}

impl VaultView {
    pub fn new(backend: Arc<dyn VaultBackend>, bus: UpdateBus, query: TrackQuery) -> Self {
        Self {
            backend,
            bus,
            query,
            projection: None,
            poll_interval: Duration::from_secs(60),
            clock: Arc::new(Utc::now),
            tracks: Vec::new(),
            playlist: None,
            undo: UndoController::default(),
            toasts: ToastManager::new(),
            loaded: false,
        }
    }

    /// The full vault: every track, filtered and sorted by a projection.
    pub fn vault(backend: Arc<dyn VaultBackend>, bus: UpdateBus, config: &Config) -> Self {
        Self::new(backend, bus, TrackQuery::all())
            .with_projection(Projection::default())
            .with_config(config)
    }

    /// The dashboard widget: the newest few ready tracks in backend order.
    pub fn ready(backend: Arc<dyn VaultBackend>, bus: UpdateBus, config: &Config) -> Self {
        let query = TrackQuery::with_status(TrackStatus::Available, config.views.ready_limit);
        Self::new(backend, bus, query).with_config(config)
    }

    fn with_config(self, config: &Config) -> Self {
        self.with_poll_interval(config.clock.poll_interval())
            .with_undo_timing(UndoTiming::from(&config.undo))
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Clamped to at least one second.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_undo_timing(mut self, timing: UndoTiming) -> Self {
        self.undo = UndoController::new(timing);
        self
    }

    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// The primary list, without the armed track.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn playlist(&self) -> Option<&PlaylistSettings> {
        self.playlist.as_ref()
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn undo_phase(&self) -> UndoPhase {
        self.undo.phase(Instant::now())
    }

    pub fn pending_undo(&self) -> Option<&ArmedUndo> {
        self.undo.pending(Instant::now())
    }

    pub fn notices(&self) -> Vec<Toast> {
        self.toasts.visible().cloned().collect()
    }

    /// Primary list with the undo placeholder back at its original index.
    fn primary_rows(&self, at: Instant) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .tracks
            .iter()
            .map(|track| Row {
                track: track.clone(),
                undo: None,
            })
            .collect();
        if let Some(armed) = self.undo.pending(at) {
            // A refetch may already hold the unearthed copy
            rows.retain(|row| row.track.id != armed.track.id);
            let index = armed.index.min(rows.len());
            rows.insert(
                index,
                Row {
                    track: armed.track.clone(),
                    undo: Some(self.undo.phase(at)),
                },
            );
        }
        rows
    }

    pub fn rows_at<Tz: TimeZone>(&self, at: Instant, now: &DateTime<Tz>) -> Vec<Row> {
        let rows = self.primary_rows(at);
        match &self.projection {
            Some(projection) => projection.apply(rows, now),
            None => rows,
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows_at(Instant::now(), &self.now().with_timezone(&Local))
    }

    pub fn grouped_rows(&self) -> Vec<(Period, Vec<Row>)> {
        let now = self.now().with_timezone(&Local);
        group_by_period(self.rows_at(Instant::now(), &now), &now)
    }

    pub fn counts(&self) -> StatusCounts {
        status_counts(&self.primary_rows(Instant::now()))
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            rows: self.rows(),
            counts: self.counts(),
            undo: self.undo_phase(),
            notices: self.notices(),
            playlist: self.playlist.clone(),
            loaded: self.loaded,
        }
    }

    // ── lifecycle ─────────────────────────────────────────────────────────────

    /// Refetch tracks and the target playlist.
    pub async fn reload(&mut self) -> Result<(), ApiError> {
        let tracks = match self.backend.list_tracks(self.query).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("view: failed to load tracks: {}", e);
                self.report_api("load tracks", &e);
                return Err(e);
            }
        };
        self.tracks = tracks;
        self.loaded = true;
        self.refresh_clock();

        match self.backend.playlist_settings().await {
            Ok(settings) => self.playlist = settings,
            Err(e) => {
                debug!("view: playlist settings unavailable: {}", e);
                self.playlist = None;
            }
        }
        debug!("view: loaded {} tracks", self.tracks.len());
        Ok(())
    }

    /// Promote matured tracks. Returns how many changed.
    pub fn refresh_clock(&mut self) -> usize {
        let now = self.now();
        let matured = clock::refresh(&mut self.tracks, now);
        if matured > 0 {
            info!("view: {} track(s) are now ready", matured);
            self.toasts
                .info(format!("{} track(s) ready to unearth", matured));
        }
        matured
    }

    /// Close an elapsed undo window and drop expired notices.
    pub fn tick(&mut self, at: Instant) -> bool {
        let expired = self.undo.expire(at);
        if expired {
            debug!("view: undo window closed");
        }
        self.toasts.tick() || expired
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = Some(projection);
    }

    // ── actions ───────────────────────────────────────────────────────────────

    fn report(&mut self, action: &str, err: &ActionError) {
        warn!("view: {} failed: {}", action, err);
        match err {
            ActionError::Api(e) => self.report_api(action, e),
            other => self.toasts.error(other.to_string()),
        }
    }

    fn report_api(&mut self, action: &str, err: &ApiError) {
        match err.kind() {
            ErrorKind::Network => self.toasts.error(format!("failed to {}: {}", action, err)),
            ErrorKind::Conflict => self.toasts.warning(format!("could not {}: {}", action, err)),
            ErrorKind::Authorization => self.toasts.error(format!(
                "cannot {}: {}, sign in or reconnect spotify",
                action, err
            )),
            ErrorKind::Malformed => self.toasts.error(format!(
                "failed to {}: unexpected response from the server",
                action
            )),
        }
    }

    fn position(&self, id: TrackId) -> Result<usize, ActionError> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(ActionError::UnknownTrack(id))
    }

    /// Add a ready track to the target playlist and open the undo window.
    pub async fn unearth(&mut self, id: TrackId) -> Result<(), ActionError> {
        let result = self.try_unearth(id).await;
        if let Err(e) = &result {
            self.report("unearth track", e);
        }
        result
    }

    async fn try_unearth(&mut self, id: TrackId) -> Result<(), ActionError> {
        let playlist_id = self
            .playlist
            .as_ref()
            .map(|p| p.playlist_id.clone())
            .ok_or(ActionError::NoPlaylist)?;
        let index = self.position(id)?;
        if self.tracks[index].status != TrackStatus::Available {
            return Err(ActionError::NotReady(id));
        }
        let spotify_id = self.tracks[index].metadata.spotify_id.clone();

        self.backend
            .add_to_playlist(&playlist_id, &[spotify_id])
            .await?;

        let track = self.tracks.remove(index);
        let title = track.metadata.title.clone();
        let superseded = self.undo.arm(ArmedUndo {
            track,
            index,
            playlist_id,
            armed_at: Instant::now(),
        });
        if let Some(previous) = superseded {
            debug!("view: undo for track {} superseded", previous.track.id);
        }

        info!("view: unearthed track {}", id);
        self.toasts
            .success(format!("{} has been added to your playlist", title));
        self.bus.publish();
        Ok(())
    }

    /// Compensate the armed unearth. `Ok(false)` when nothing is armed.
    pub async fn undo(&mut self) -> Result<bool, ActionError> {
        let Some(armed) = self.undo.pending(Instant::now()).cloned() else {
            debug!("view: nothing to undo");
            return Ok(false);
        };
        let spotify_id = armed.track.metadata.spotify_id.clone();

        if let Err(e) = self
            .backend
            .remove_from_playlist(&armed.playlist_id, &[spotify_id])
            .await
        {
            let err = ActionError::from(e);
            self.report("undo track addition", &err);
            return Err(err);
        }

        self.undo.clear();
        let mut track = armed.track;
        track.status = TrackStatus::Available;
        let title = track.metadata.title.clone();
        self.tracks.retain(|t| t.id != track.id);
        let index = armed.index.min(self.tracks.len());
        self.tracks.insert(index, track);

        info!("view: undid unearth of {}", title);
        self.toasts.success(format!("{} restored to ready tracks", title));
        self.bus.publish();
        Ok(true)
    }

    pub async fn delete(&mut self, id: TrackId) -> Result<(), ActionError> {
        if let Err(e) = self.backend.delete_track(id).await {
            let err = ActionError::from(e);
            self.report("delete track", &err);
            return Err(err);
        }
        self.tracks.retain(|t| t.id != id);
        if matches!(self.undo.state(), UndoState::Armed(armed) if armed.track.id == id) {
            self.undo.clear();
        }
        self.toasts.success("track deleted");
        self.bus.publish();
        Ok(())
    }

    /// Make a sealed track ready before its period ends.
    pub async fn unlock_early(&mut self, id: TrackId) -> Result<(), ActionError> {
        let result = self.try_unlock(id).await;
        if let Err(e) = &result {
            self.report("unlock track", e);
        }
        result
    }

    async fn try_unlock(&mut self, id: TrackId) -> Result<(), ActionError> {
        let index = self.position(id)?;
        if self.tracks[index].status != TrackStatus::Pending {
            return Err(ActionError::NotSealed(id));
        }
        let updated = self.backend.unlock_track(id).await?;
        let title = updated.metadata.title.clone();
        if let Some(slot) = self.tracks.iter_mut().find(|t| t.id == id) {
            *slot = updated;
        }
        self.toasts.success(format!("{} is ready to unearth", title));
        self.bus.publish();
        Ok(())
    }

    async fn handle_command(&mut self, cmd: ViewCommand) {
        // Failures are already reported as notices
        let _ = match cmd {
            ViewCommand::Reload => self.reload().await.map_err(ActionError::from),
            ViewCommand::Unearth(id) => self.unearth(id).await,
            ViewCommand::Undo => self.undo().await.map(|_| ()),
            ViewCommand::Delete(id) => self.delete(id).await,
            ViewCommand::UnlockEarly(id) => self.unlock_early(id).await,
            ViewCommand::SetProjection(projection) => {
                self.set_projection(projection);
                Ok(())
            }
            ViewCommand::Shutdown => Ok(()),
        };
    }

    // ── event loop ────────────────────────────────────────────────────────────

    /// Mount the view. Returns on `Shutdown`, when the command channel closes
    /// or when `cancel` fires; every timer and the bus subscription go with it.
    /// Until a load succeeds, each poll tick retries it.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ViewCommand>,
        snapshots: watch::Sender<ViewSnapshot>,
        cancel: CancellationToken,
    ) {
        info!("view: mounted");
        let changed = Arc::new(Notify::new());
        let _subscription = {
            let changed = Arc::clone(&changed);
            self.bus.subscribe(move || changed.notify_one())
        };

        let _ = self.reload().await;
        snapshots.send_replace(self.snapshot());

        // The mount load above stands in for the first tick
        let mut poll =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.undo.next_deadline(Instant::now());
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("view: cancelled");
                    break;
                }
                _ = poll.tick() => {
                    if self.loaded {
                        self.refresh_clock();
                    } else {
                        let _ = self.reload().await;
                    }
                }
                _ = changed.notified() => {
                    let _ = self.reload().await;
                }
                _ = wake_at(deadline) => {}
                cmd = commands.recv() => match cmd {
                    None | Some(ViewCommand::Shutdown) => break,
                    Some(cmd) => {
                        debug!("view: command {:?}", cmd);
                        self.handle_command(cmd).await;
                    }
                },
            }
            self.tick(Instant::now());
            snapshots.send_replace(self.snapshot());
        }

        info!("view: unmounted");
    }
}

async fn wake_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Seal ──────────────────────────────────────────────────────────────────────

/// Seal `metadata` and let mounted views know.
pub async fn seal_track(
    backend: &dyn VaultBackend,
    bus: &UpdateBus,
    metadata: &vault_proto::track::TrackMetadata,
) -> Result<Track, ApiError> {
    let track = backend.create_track(metadata).await?;
    bus.publish();
    Ok(track)
}

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use vault_client::api::ApiClient;
use vault_client::backend::VaultBackend;
use vault_client::bus::UpdateBus;
use vault_client::search::search;
use vault_client::toast::{Severity, Toast};
use vault_client::undo::UndoPhase;
use vault_client::view::{seal_track, Row, VaultView, ViewCommand, ViewSnapshot};
use vault_proto::clock;
use vault_proto::config::Config;
use vault_proto::platform;
use vault_proto::projection::{DateFilter, Projection, SortOrder, StatusCounts, Tab};
use vault_proto::protocol::PlaylistSettings;
use vault_proto::track::{TrackId, TrackStatus};

/// Read instead of prompting when set.
const PASSWORD_ENV: &str = "VAULT_PASSWORD";

#[derive(Parser)]
#[command(name = "vault", version, about = "Seal tracks now, unearth them later")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the session for later commands
    Login { username: String },
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show the vault
    List(ListArgs),
    /// Search Spotify; hits already in the vault are marked
    Search { query: Vec<String> },
    /// Search and seal one of the hits
    Seal {
        query: Vec<String>,
        /// 1-based position in the search results
        #[arg(long, default_value_t = 1)]
        pick: usize,
    },
    Delete { id: TrackId },
    /// Make a sealed track ready now
    Unlock { id: TrackId },
    /// Add a ready track to the target playlist, with a short undo window
    Unearth { id: TrackId },
    /// Keep the vault mounted and redraw on every change
    Watch(ListArgs),
    Spotify {
        #[command(subcommand)]
        command: SpotifyCommand,
    },
}

#[derive(Subcommand)]
enum SpotifyCommand {
    Status,
    /// Print the authorization URL
    Connect,
    Playlists,
    /// Choose the playlist unearthed tracks go to
    Use { playlist_id: String },
    Disconnect,
}

#[derive(Args, Clone)]
struct ListArgs {
    /// all | sealed | ready | unearthed
    #[arg(long, default_value = "all", value_parser = parse_tab)]
    tab: Tab,
    /// newest | oldest | title | artist
    #[arg(long, default_value = "newest", value_parser = parse_sort)]
    sort: SortOrder,
    /// week | month
    #[arg(long, conflicts_with_all = ["from", "to"])]
    since: Option<String>,
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Do not group by period
    #[arg(long)]
    flat: bool,
}

fn parse_tab(s: &str) -> Result<Tab, String> {
    Tab::from_label(&s.to_lowercase()).ok_or_else(|| format!("unknown tab '{}'", s))
}

fn parse_sort(s: &str) -> Result<SortOrder, String> {
    SortOrder::from_label(&s.to_lowercase()).ok_or_else(|| format!("unknown sort '{}'", s))
}

impl ListArgs {
    fn projection(&self) -> Result<Projection> {
        let date_filter = match (self.since.as_deref(), self.from, self.to) {
            (Some("week"), _, _) => DateFilter::ThisWeek,
            (Some("month"), _, _) => DateFilter::ThisMonth,
            (Some(other), _, _) => bail!("unknown period '{}', expected week or month", other),
            (None, Some(from), Some(to)) => DateFilter::Range { from, to },
            _ => DateFilter::All,
        };
        Ok(Projection {
            tab: self.tab,
            date_filter,
            sort: self.sort,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("vault.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("vault log: {}", log_path.display());
    info!("vault starting");

    let config = Config::load().context("failed to load config")?;
    let client = Arc::new(ApiClient::from_config(&config)?);
    let bus = UpdateBus::new();

    match cli.command {
        Command::Login { username } => login(&client, &username).await,
        Command::Logout => {
            client.logout().await?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            let spotify = if user.spotify_connected {
                "connected"
            } else {
                "not connected"
            };
            println!("{} (spotify {})", user.username, spotify);
            Ok(())
        }
        Command::List(args) => list(client, bus, &config, &args).await,
        Command::Search { query } => search_cmd(client.as_ref(), &query.join(" ")).await,
        Command::Seal { query, pick } => seal(client.as_ref(), &bus, &query.join(" "), pick).await,
        Command::Delete { id } => {
            let mut view = VaultView::vault(client, bus, &config);
            view.reload().await?;
            view.delete(id).await?;
            print_notices(&view.notices());
            Ok(())
        }
        Command::Unlock { id } => {
            let mut view = VaultView::vault(client, bus, &config);
            view.reload().await?;
            view.unlock_early(id).await?;
            print_notices(&view.notices());
            Ok(())
        }
        Command::Unearth { id } => unearth(client, bus, &config, id).await,
        Command::Watch(args) => watch_vault(client, bus, &config, &args).await,
        Command::Spotify { command } => spotify(&client, command).await,
    }
}

// ── commands ──────────────────────────────────────────────────────────────────

async fn login(client: &ApiClient, username: &str) -> Result<()> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => {
            eprint!("password: ");
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    let user = client.login(username, &password).await?;
    println!("signed in as {}", user.username);
    if !user.spotify_connected {
        println!("spotify is not connected yet, run `vault spotify connect`");
    }
    Ok(())
}

async fn list(
    client: Arc<ApiClient>,
    bus: UpdateBus,
    config: &Config,
    args: &ListArgs,
) -> Result<()> {
    let mut view = VaultView::vault(client, bus, config).with_projection(args.projection()?);
    view.reload().await?;

    let now = view.now();
    println!("{}", counts_line(&view.counts()));
    if args.flat {
        for row in view.rows() {
            println!("{}", render_row(&row, now));
        }
        return Ok(());
    }
    let groups = view.grouped_rows();
    if groups.is_empty() {
        println!("nothing here yet");
    }
    for (period, rows) in groups {
        println!("\n{}", period.label());
        for row in rows {
            println!("{}", render_row(&row, now));
        }
    }
    Ok(())
}

async fn search_cmd(backend: &dyn VaultBackend, query: &str) -> Result<()> {
    let results = search(backend, query).await?;
    if results.is_empty() {
        println!("no results");
    }
    for (i, result) in results.iter().enumerate() {
        let marker = if result.in_vault { "  [in vault]" } else { "" };
        println!(
            "{:>3}. {} ({}){}",
            i + 1,
            result.metadata.display_name(),
            result.metadata.album,
            marker
        );
    }
    Ok(())
}

async fn seal(backend: &dyn VaultBackend, bus: &UpdateBus, query: &str, pick: usize) -> Result<()> {
    let results = search(backend, query).await?;
    let Some(chosen) = pick.checked_sub(1).and_then(|i| results.get(i)) else {
        bail!("no result #{} for '{}' ({} found)", pick, query, results.len());
    };
    let track = seal_track(backend, bus, &chosen.metadata).await?;
    match track.available_at {
        Some(at) => println!(
            "sealed {} until {}",
            track.metadata.display_name(),
            at.with_timezone(&Local).format("%Y-%m-%d")
        ),
        None => println!("sealed {}", track.metadata.display_name()),
    }
    Ok(())
}

/// Mount a view, unearth, then hold the undo window open on the terminal.
async fn unearth(
    client: Arc<ApiClient>,
    bus: UpdateBus,
    config: &Config,
    id: TrackId,
) -> Result<()> {
    let view = VaultView::vault(client, bus, config);
    let (commands, rx) = mpsc::channel(8);
    let (tx, mut snapshots) = watch::channel(ViewSnapshot::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(view.run(rx, tx, cancel.clone()));

    let mounted = snapshots.wait_for(mount_settled).await?.clone();
    if !mounted.loaded {
        print_latest(&mounted.notices);
        cancel.cancel();
        task.await?;
        bail!("could not load the vault");
    }
    commands.send(ViewCommand::Unearth(id)).await?;
    let outcome = snapshots
        .wait_for(|s| s.undo.is_active() || has_failure(&s.notices))
        .await?
        .clone();
    print_latest(&outcome.notices);

    if outcome.undo.is_active() {
        println!(
            "press enter within {}s to undo",
            config.undo.clear_after().as_secs()
        );
        let undo_requested = tokio::select! {
            _ = enter_pressed() => true,
            _ = snapshots.wait_for(|s| !s.undo.is_active()) => false,
        };
        if undo_requested {
            commands.send(ViewCommand::Undo).await?;
            let done = snapshots
                .wait_for(|s| !s.undo.is_active() || has_failure(&s.notices))
                .await?
                .clone();
            print_latest(&done.notices);
        } else {
            println!("undo window closed");
        }
    }

    cancel.cancel();
    task.await?;
    Ok(())
}

async fn watch_vault(
    client: Arc<ApiClient>,
    bus: UpdateBus,
    config: &Config,
    args: &ListArgs,
) -> Result<()> {
    let view = VaultView::vault(client, bus, config).with_projection(args.projection()?);
    let (_commands, rx) = mpsc::channel(8);
    let (tx, mut snapshots) = watch::channel(ViewSnapshot::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(view.run(rx, tx, cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                draw(&snapshot);
            }
        }
    }

    cancel.cancel();
    task.await?;
    Ok(())
}

async fn spotify(client: &ApiClient, command: SpotifyCommand) -> Result<()> {
    match command {
        SpotifyCommand::Status => {
            let status = client.spotify_status().await?;
            match (status.connected, status.expires_at) {
                (true, Some(expires)) => println!(
                    "connected, token expires {}",
                    expires.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                ),
                (true, None) => println!("connected"),
                (false, _) => println!("not connected"),
            }
            match client.playlist_settings().await? {
                Some(settings) => println!("target playlist: {}", settings.playlist_name),
                None => println!("no target playlist selected"),
            }
        }
        SpotifyCommand::Connect => {
            let url = client.spotify_auth_url().await?;
            println!("open this URL to connect spotify:\n{}", url);
        }
        SpotifyCommand::Playlists => {
            let current = client.playlist_settings().await?;
            for playlist in client.playlists().await? {
                let selected = current
                    .as_ref()
                    .is_some_and(|c| c.playlist_id == playlist.id);
                let total = playlist.tracks.as_ref().map_or(0, |t| t.total);
                println!(
                    "{} {}  {} ({} tracks)",
                    if selected { "*" } else { " " },
                    playlist.id,
                    playlist.name,
                    total
                );
            }
        }
        SpotifyCommand::Use { playlist_id } => {
            let playlists = client.playlists().await?;
            let Some(playlist) = playlists.into_iter().find(|p| p.id == playlist_id) else {
                bail!("no playlist with id {}", playlist_id);
            };
            client
                .update_playlist_settings(&PlaylistSettings {
                    playlist_id: playlist.id,
                    playlist_name: playlist.name.clone(),
                })
                .await?;
            println!("unearthed tracks will go to {}", playlist.name);
        }
        SpotifyCommand::Disconnect => {
            client.disconnect_spotify().await?;
            println!("spotify disconnected");
        }
    }
    Ok(())
}

// ── rendering ─────────────────────────────────────────────────────────────────

/// Resolves on the next line from stdin. The read runs on a detached thread
/// so an abandoned prompt never holds up exit.
async fn enter_pressed() {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });
    let _ = rx.await;
}

fn has_failure(notices: &[Toast]) -> bool {
    notices
        .iter()
        .any(|n| matches!(n.severity, Severity::Error | Severity::Warning))
}

/// The first load either landed or reported why it did not.
fn mount_settled(snapshot: &ViewSnapshot) -> bool {
    snapshot.loaded || has_failure(&snapshot.notices)
}

fn print_latest(notices: &[Toast]) {
    if let Some(notice) = notices.first() {
        println!("{}", notice);
    }
}

fn print_notices(notices: &[Toast]) {
    for notice in notices.iter().rev() {
        println!("{}", notice);
    }
}

fn counts_line(counts: &StatusCounts) -> String {
    format!(
        "sealed {} · ready {} · unearthed {}",
        counts.sealed, counts.ready, counts.unearthed
    )
}

fn progress_bar(percent: f64) -> String {
    const WIDTH: usize = 20;
    let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;
    let filled = filled.min(WIDTH);
    format!(
        "{}{} {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(WIDTH - filled),
        percent
    )
}

fn render_row(row: &Row, now: DateTime<Utc>) -> String {
    let track = &row.track;
    let detail = match (row.undo, track.status) {
        (Some(UndoPhase::FadingOut), _) => "added to playlist, undo closing".to_string(),
        (Some(_), _) => "added to playlist, undo available".to_string(),
        (None, TrackStatus::Pending) => match clock::time_remaining(track, now) {
            Some(left) => format!("{}  {}", progress_bar(clock::progress(track, now)), left),
            None => clock::seal_summary(track, now),
        },
        (None, _) => clock::seal_summary(track, now),
    };
    format!(
        "{:>6}  {:<9}  {}  ({})",
        track.id,
        track.status.label(),
        track.metadata.display_name(),
        detail
    )
}

fn draw(snapshot: &ViewSnapshot) {
    let now = Utc::now();
    print!("\x1b[2J\x1b[H");
    println!("{}", counts_line(&snapshot.counts));
    if let Some(playlist) = &snapshot.playlist {
        println!("target playlist: {}", playlist.playlist_name);
    }
    println!();
    for row in &snapshot.rows {
        println!("{}", render_row(row, now));
    }
    if !snapshot.notices.is_empty() {
        println!();
        print_notices(&snapshot.notices);
    }
    let _ = std::io::stdout().flush();
}

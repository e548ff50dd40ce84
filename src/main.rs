use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emotionify::config::AppConfig;
use emotionify::projector::FeatureKey;
use emotionify::render::{AxisSelection, PlotSeries};
use emotionify::spotify::{Credential, HttpSpotifyClient};
use emotionify::sync::{SyncReport, SyncSession};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(name = "emotionify", version, about = "Plot playlist tracks by their audio features")]
struct Cli {
    /// Spotify access token
    #[arg(long, env = "SPOTIFY_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Seconds until the token expires (as returned by the authorization flow)
    #[arg(long, global = true)]
    expires_in: Option<i64>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account the token belongs to
    Whoami,

    /// List the account's playlists
    Playlists,

    /// List audio features usable as plot axes
    Features,

    /// Plot a playlist's tracks on two audio-feature axes
    Plot {
        /// Playlist id or exact name (case-insensitive)
        playlist: String,

        /// Feature for the x axis (defaults to config plot.x_axis)
        #[arg(short, long)]
        x: Option<String>,

        /// Feature for the y axis (defaults to config plot.y_axis)
        #[arg(short, long)]
        y: Option<String>,

        /// Print the plotly figure as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Write the plotly figure JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = AppConfig::load();

    if let Commands::Features = cli.command {
        print_features();
        return Ok(());
    }

    let token = cli
        .token
        .clone()
        .context("No access token. Pass --token or set SPOTIFY_TOKEN.")?;
    let credential = match cli.expires_in {
        Some(secs) => Credential::expiring_in(token, secs),
        None => Credential::new(token),
    };

    // Single-threaded: fetches only suspend their own continuation
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    rt.block_on(run(cli.command, config, credential))
}

async fn run(command: Commands, config: AppConfig, credential: Credential) -> Result<()> {
    let client = HttpSpotifyClient::new(&config.api.base_url, config.api.timeout());
    let mut session = SyncSession::new(client);

    let pb = spinner("Signing in...");
    let report = session.set_credential(Some(credential)).await;
    pb.finish_and_clear();
    check(&report).context("Sign-in failed")?;

    let identity = session
        .model()
        .identity
        .clone()
        .context("Sign-in returned no account")?;

    match command {
        Commands::Features => print_features(),

        Commands::Whoami => {
            println!("Account:  {}", identity.id);
            println!("Name:     {}", identity.label());
            if let Some(country) = &identity.country {
                println!("Country:  {}", country);
            }
            if let Some(product) = &identity.product {
                println!("Product:  {}", product);
            }
        }

        Commands::Playlists => {
            let mut playlists: Vec<_> = session.model().playlists.values().collect();
            if playlists.is_empty() {
                println!("No playlists found.");
                return Ok(());
            }
            playlists.sort_by_key(|p| p.name.to_lowercase());

            println!("{:<24} {:<40} {:>6}  {}", "Id", "Name", "Tracks", "Owner");
            println!("{}", "-".repeat(90));
            for p in playlists {
                println!(
                    "{:<24} {:<40} {:>6}  {}",
                    p.id,
                    truncate(&p.name, 40),
                    p.total_tracks,
                    p.owner.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Plot { playlist, x, y, json, output } => {
            let x = x.unwrap_or_else(|| config.plot.x_axis.clone());
            let y = y.unwrap_or_else(|| config.plot.y_axis.clone());
            for key in [&x, &y] {
                if key.parse::<FeatureKey>().is_err() {
                    log::warn!("\"{key}\" is not a known audio feature; tracks will plot at the origin");
                }
            }
            let gradient = config.plot.gradient().context("Invalid plot colors in config")?;

            let playlist_id = session
                .model()
                .find_playlist(&playlist)
                .map(|p| p.id.clone())
                .with_context(|| format!("No playlist matching \"{playlist}\""))?;

            let pb = spinner("Fetching tracks and audio features...");
            let report = session.refresh_playlist(&playlist_id).await?;
            pb.finish_and_clear();
            check(&report).context("Playlist sync failed")?;

            let axes = AxisSelection::new(&x, &y);
            let series = session.series(&playlist_id, &axes, &gradient)?;

            if let Some(path) = &output {
                let figure = serde_json::to_string_pretty(&series.to_plotly_json())?;
                std::fs::write(path, figure)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote {} points to {}", series.points.len(), path.display());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&series.to_plotly_json())?);
            } else {
                print_series(&series);
            }

            if !series.diagnostics.is_empty() {
                eprintln!(
                    "{} tracks plotted at the origin (features missing or not numeric)",
                    series.diagnostics.len()
                );
            }
        }
    }

    Ok(())
}

fn check(report: &SyncReport) -> Result<()> {
    match report.auth_error().or(report.errors.first()) {
        Some(e) => Err(e.clone().into()),
        None => Ok(()),
    }
}

fn spinner(msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_features() {
    println!("{:<18} {}", "Feature", "Label");
    println!("{}", "-".repeat(36));
    for key in FeatureKey::ALL {
        println!("{:<18} {}", key.name(), key.label());
    }
}

/// Print plotted points in playlist order.
fn print_series(series: &PlotSeries) {
    println!(
        "{:<30} {:<24} {:>10} {:>10}  {}",
        "Title",
        "Artist",
        truncate(&series.axes.x, 10),
        truncate(&series.axes.y, 10),
        "Color"
    );
    println!("{}", "-".repeat(86));

    for (p, color) in series.points.iter().zip(&series.trace.marker.color) {
        println!(
            "{:<30} {:<24} {:>10.3} {:>10.3}  {}",
            truncate(&p.track.title, 30),
            truncate(&p.track.artist, 24),
            p.x,
            p.y,
            color
        );
    }

    println!();
    println!("x = {}, y = {}", series.axes.x_label, series.axes.y_label);
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod db;
mod error;
mod matching;
mod models;
mod report;
mod seed;
mod server;
mod store;

use db::PgStore;
use models::{NewSession, Session, Slot, WeeklyAvailability};
use store::{MemoryStore, SessionStore};

#[derive(Parser)]
#[command(name = "tabletop-matcher")]
#[command(about = "Find tabletop game sessions that fit your week", long_about = None)]
#[command(version)]
struct Cli {
    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Local UTC offset in minutes used to place sessions into weekly slots
    #[arg(
        long,
        global = true,
        env = "MATCH_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_hyphen_values = true
    )]
    utc_offset_minutes: i32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo players, availability and sessions
    Seed,
    /// Import sessions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank upcoming sessions for a player
    Rank {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown recommendation report
    Report {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "recommendations.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Replace a player's weekly availability
    SetAvailability {
        #[arg(long)]
        user: Uuid,
        /// Comma separated slots, e.g. weekday-evening,weekend-afternoon
        #[arg(long, value_delimiter = ',')]
        slots: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Schedule a new session hosted by a player
    CreateSession {
        #[arg(long)]
        title: String,
        #[arg(long)]
        game: String,
        #[arg(long)]
        host: Uuid,
        #[arg(long)]
        host_name: String,
        #[arg(long)]
        location: String,
        /// RFC 3339 start time, e.g. 2026-11-07T18:00:00Z
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, default_value_t = 2)]
        min_players: i32,
        #[arg(long)]
        max_players: i32,
    },
    /// Add a player to a session
    Join {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        player: Uuid,
    },
    /// Remove a player from a session
    Leave {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        player: Uuid,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "MATCHER_PORT", default_value_t = 8080)]
        port: u16,
        /// Use a seeded in-memory store instead of Postgres
        #[arg(long)]
        memory: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabletop_matcher=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let offset = utc_offset(cli.utc_offset_minutes)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(cli.database_url.as_deref()).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(cli.database_url.as_deref()).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(cli.database_url.as_deref()).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} sessions from {}.", csv.display());
        }
        Commands::Rank { user, limit } => {
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            let now = Utc::now();
            let availability = store.get_availability(user).await?;
            let sessions = store.upcoming_sessions(now).await?;

            let lines = rank_lines(availability.as_ref(), &sessions, now, offset, limit);
            if lines.is_empty() {
                println!("No upcoming sessions.");
                return Ok(());
            }

            match availability {
                Some(_) => println!("Best matches for {user}:"),
                None => println!("No availability on file for {user}; upcoming sessions by start time:"),
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Report { user, out, limit } => {
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            let now = Utc::now();
            let availability = store.get_availability(user).await?;
            let sessions = store.upcoming_sessions(now).await?;
            let report = report::build_report(
                &user.to_string(),
                availability.as_ref(),
                &sessions,
                now,
                offset,
                limit,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::SetAvailability { user, slots, notes } => {
            let parsed = slots
                .iter()
                .map(|label| {
                    Slot::from_label(label.trim())
                        .with_context(|| format!("unknown slot {label:?}"))
                })
                .collect::<anyhow::Result<Vec<Slot>>>()?;
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            store
                .upsert_availability(&WeeklyAvailability::from_slots(user, &parsed, notes))
                .await?;
            println!("Availability saved for {user}.");
        }
        Commands::CreateSession {
            title,
            game,
            host,
            host_name,
            location,
            start,
            end,
            min_players,
            max_players,
        } => {
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            let created = store
                .create_session(NewSession {
                    title,
                    game,
                    host_id: host,
                    host_name,
                    location,
                    start_time: start,
                    end_time: end,
                    min_players,
                    max_players,
                })
                .await?;
            println!("Created session {}: {}", created.id, describe(&created, offset));
        }
        Commands::Join { session, player } => {
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            let updated = store.join_session(session, player).await?;
            println!(
                "Joined {} ({}/{} players).",
                updated.title, updated.current_players, updated.max_players
            );
        }
        Commands::Leave { session, player } => {
            let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
            let updated = store.leave_session(session, player).await?;
            println!(
                "Left {} ({}/{} players).",
                updated.title, updated.current_players, updated.max_players
            );
        }
        Commands::Serve { port, memory } => {
            if memory {
                let store = MemoryStore::new();
                let created = seed::populate(&store, Utc::now()).await?;
                info!(created, "seeded in-memory store");
                serve(store, offset, port).await?;
            } else {
                let store = PgStore::new(connect(cli.database_url.as_deref()).await?);
                serve(store, offset, port).await?;
            }
        }
    }

    Ok(())
}

fn utc_offset(minutes: i32) -> anyhow::Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .context("utc offset must be within +/- 24 hours")
}

/// One line per ranked session. Order and scores come from the same
/// availability snapshot.
fn rank_lines(
    availability: Option<&WeeklyAvailability>,
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
    limit: usize,
) -> Vec<String> {
    match availability {
        Some(availability) => matching::score_sessions(availability, sessions, now, offset)
            .iter()
            .take(limit)
            .map(|entry| {
                format!(
                    "- {}, score {}",
                    describe(&entry.session, offset),
                    entry.score.total()
                )
            })
            .collect(),
        None => matching::upcoming_chronological(sessions, now)
            .iter()
            .take(limit)
            .map(|session| format!("- {}", describe(session, offset)))
            .collect(),
    }
}

fn describe(session: &Session, offset: FixedOffset) -> String {
    format!(
        "{} ({}) {} at {}, {}/{} players",
        session.title,
        session.game,
        session.start_time.with_timezone(&offset).format("%a %Y-%m-%d %H:%M"),
        session.location,
        session.current_players,
        session.max_players
    )
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let database_url =
        database_url.context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn serve<S: SessionStore + 'static>(
    store: S,
    offset: FixedOffset,
    port: u16,
) -> anyhow::Result<()> {
    let app = server::create_router(server::AppState {
        store: Arc::new(store),
        offset,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session(title: &str, start_time: DateTime<Utc>, current: i32) -> Session {
        Session {
            id: Uuid::new_v4(),
            title: title.to_string(),
            game: "Azul".to_string(),
            host_id: Uuid::new_v4(),
            host_name: "Avery Lee".to_string(),
            location: "Games cafe".to_string(),
            start_time,
            end_time: start_time + Duration::hours(2),
            min_players: 2,
            max_players: 5,
            current_players: current,
        }
    }

    #[test]
    fn rank_lines_print_scores_in_ranked_order() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let offset = utc_offset(0).unwrap();
        let sessions = vec![
            session("Tuesday", Utc.with_ymd_and_hms(2026, 3, 10, 19, 0, 0).unwrap(), 2),
            session("Saturday", Utc.with_ymd_and_hms(2026, 3, 7, 19, 0, 0).unwrap(), 2),
            session("Past", Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0).unwrap(), 2),
        ];
        let availability = WeeklyAvailability::from_slots(
            Uuid::new_v4(),
            &[Slot::from_label("weekend-evening").unwrap()],
            None,
        );

        let lines = rank_lines(Some(&availability), &sessions, now, offset, 10);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- Saturday") && lines[0].ends_with("score 8"));
        assert!(lines[1].starts_with("- Tuesday") && lines[1].ends_with("score 5"));

        let fallback = rank_lines(None, &sessions, now, offset, 1);
        assert_eq!(fallback.len(), 1);
        assert!(fallback[0].starts_with("- Saturday"));
        assert!(!fallback[0].contains("score"));
    }

    #[test]
    fn utc_offset_accepts_real_offsets() {
        assert_eq!(utc_offset(0).unwrap().local_minus_utc(), 0);
        assert_eq!(utc_offset(-300).unwrap().local_minus_utc(), -300 * 60);
        assert_eq!(utc_offset(330).unwrap().local_minus_utc(), 330 * 60);
    }

    #[test]
    fn utc_offset_rejects_out_of_range_and_overflowing_minutes() {
        assert!(utc_offset(24 * 60).is_err());
        assert!(utc_offset(i32::MAX).is_err());
        assert!(utc_offset(i32::MIN).is_err());
    }
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use api::{ApiConfig, ApiState};
use clap::{Parser, Subcommand};
use learn_core::model::Curriculum;
use services::{AppServices, Clock};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Parser)]
#[command(name = "scilearn", version, about = "Science course server")]
struct Cli {
    /// SQLite database URL or file path.
    #[arg(long, global = true, env = "LEARN_DB_URL", default_value = "sqlite://scilearn.sqlite3")]
    db: String,

    /// Lifetime of a sign-in token.
    #[arg(long, global = true, env = "LEARN_TOKEN_TTL_HOURS", default_value_t = 12)]
    token_ttl_hours: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long, env = "LEARN_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Directory with the built SPA (`index.html`, `assets/`).
        #[arg(long, env = "LEARN_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        /// Shared secret for `POST /api/admin/seed`.
        #[arg(long, env = "LEARN_SEED_TOKEN")]
        seed_token: Option<String>,
    },
    /// Create or promote the first administrator and exit.
    Seed {
        #[arg(long, env = "LEARN_ADMIN_EMAIL")]
        email: String,

        #[arg(long, env = "LEARN_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        display_name: Option<String>,
    },
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == MEMORY_URL || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == MEMORY_URL {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    if let Ok(path) = &env_loaded {
        info!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();
    if cli.token_ttl_hours <= 0 {
        bail!("--token-ttl-hours must be positive");
    }

    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    let services = AppServices::new_sqlite(
        &db_url,
        Clock::System,
        Curriculum::science(),
        chrono::Duration::hours(cli.token_ttl_hours),
    )
    .await
    .with_context(|| format!("opening {db_url}"))?;
    info!(db = %db_url, "database ready");

    match cli.command {
        Command::Serve {
            bind,
            static_dir,
            seed_token,
        } => {
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            let config = ApiConfig {
                static_dir,
                seed_token: seed_token.filter(|t| !t.trim().is_empty()),
            };
            api::serve(listener, ApiState::new(services, config)).await?;
        }
        Command::Seed {
            email,
            password,
            display_name,
        } => {
            let outcome = services
                .admin()
                .seed(&email, &password, display_name)
                .await?;
            if outcome.created {
                println!("created admin {} ({})", outcome.user.email, outcome.user.id);
            } else {
                println!("admin {} ready ({})", outcome.user.email, outcome.user.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_full_urls_pass_through() {
        assert_eq!(normalize_sqlite_url(MEMORY_URL), MEMORY_URL);
        assert_eq!(
            normalize_sqlite_url(" sqlite:///var/lib/scilearn.db "),
            "sqlite:///var/lib/scilearn.db"
        );
    }

    #[test]
    fn relative_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/dev.sqlite3");
        let path = url.strip_prefix("sqlite://").unwrap();
        assert!(Path::new(path).is_absolute());
        assert!(path.ends_with("data/dev.sqlite3"));
    }

    #[test]
    fn prepare_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("db.sqlite3");
        let url = format!("sqlite://{}", file.display());
        prepare_sqlite_file(&url).unwrap();
        assert!(file.exists());
        prepare_sqlite_file(MEMORY_URL).unwrap();
        assert!(prepare_sqlite_file("postgres://x").is_err());
    }

    #[test]
    fn cli_parses_seed() {
        let cli = Cli::try_parse_from([
            "scilearn",
            "--db",
            "sqlite::memory:",
            "seed",
            "--email",
            "a@b.test",
            "--password",
            "longenough",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Seed { .. }));
        assert_eq!(cli.db, MEMORY_URL);
    }
}

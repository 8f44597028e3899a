// context-vault/src/main.rs

#[cfg(feature = "cli")]
mod cli {
    use anyhow::Result;
    use clap::{Parser, Subcommand};
    use context_vault::{
        telemetry, ArchiveDatabase, CheckpointTrigger, RecoveryComposer, Synchronizer, VaultConfig, WatchOptions,
    };
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::info;

    #[derive(Parser)]
    #[command(name = "context-vault", version, about = "Durable archive for agent session transcripts")]
    struct Cli {
        /// Override VAULT_DB_PATH.
        #[arg(long, global = true)]
        db: Option<PathBuf>,
        /// Override VAULT_AGENTS_ROOT.
        #[arg(long, global = true)]
        agents_root: Option<PathBuf>,
        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Run one synchronization pass, or a single transcript.
        Sync {
            #[arg(long)]
            file: Option<PathBuf>,
        },
        /// Synchronize periodically until interrupted.
        Watch {
            #[arg(long)]
            interval: Option<u64>,
        },
        /// Full-text search over archived messages.
        Search {
            query: String,
            #[arg(long)]
            session: Option<String>,
            #[arg(long, default_value_t = 20)]
            limit: usize,
        },
        /// Print (or write) a recovery document for a session.
        Recover {
            session: String,
            #[arg(long)]
            messages: Option<usize>,
            #[arg(long)]
            output: Option<PathBuf>,
        },
        /// Record a named checkpoint for a session.
        Snapshot {
            session: String,
            name: String,
            #[arg(long, default_value = "manual")]
            trigger: String,
        },
        /// Database totals, or per-session statistics.
        Stats {
            #[arg(long)]
            session: Option<String>,
        },
        /// Most recently active sessions.
        Sessions {
            #[arg(long, default_value_t = 20)]
            limit: usize,
        },
    }

    pub async fn run() -> Result<()> {
        telemetry::init_tracing();
        let cli = Cli::parse();

        let mut cfg = VaultConfig::from_env()?;
        if let Some(db) = cli.db {
            cfg.db_path = db;
        }
        if let Some(root) = cli.agents_root {
            cfg.agents_root = root;
        }
        cfg.print_config();

        let db = Arc::new(ArchiveDatabase::open(&cfg.db_path, cfg.busy_timeout())?);
        let result = dispatch(cli.command, &cfg, Arc::clone(&db)).await;
        db.close()?;
        result
    }

    async fn dispatch(command: Command, cfg: &VaultConfig, db: Arc<ArchiveDatabase>) -> Result<()> {
        match command {
            Command::Sync { file } => {
                let mut sync =
                    Synchronizer::new(db, &cfg.agents_root).with_compaction_slack(cfg.compaction_slack);
                match file {
                    Some(path) => print_json(&sync.synchronize_one(&path)?)?,
                    None => print_json(&sync.synchronize_all()?)?,
                }
            }
            Command::Watch { interval } => {
                let interval = interval.map(|s| Duration::from_secs(s.max(1))).unwrap_or(cfg.watch_interval());
                let handle = Synchronizer::new(db, &cfg.agents_root)
                    .with_compaction_slack(cfg.compaction_slack)
                    .spawn_watch(WatchOptions::every(interval));

                tokio::signal::ctrl_c().await?;
                info!("Interrupt received, finishing current pass");
                let (_, report) = handle.stop().await?;
                print_json(&report)?;
            }
            Command::Search { query, session, limit } => {
                print_json(&db.messages.search(&query, session.as_deref(), limit)?)?;
            }
            Command::Recover { session, messages, output } => {
                let composer = RecoveryComposer::new(db);
                let count = messages.unwrap_or(cfg.recovery_messages);
                match output {
                    Some(path) => {
                        composer.compose_to_file(&session, count, &path)?;
                    }
                    None => println!("{}", composer.compose(&session, count)?),
                }
            }
            Command::Snapshot { session, name, trigger } => {
                let trigger: CheckpointTrigger = trigger.parse()?;
                print_json(&db.checkpoints.create_checkpoint(&session, &name, trigger)?)?;
            }
            Command::Stats { session } => match session {
                Some(id) => print_json(&db.session_stats(&id)?)?,
                None => print_json(&db.stats()?)?,
            },
            Command::Sessions { limit } => print_json(&db.messages.list_sessions(limit)?)?,
        }
        Ok(())
    }

    fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use log::LevelFilter;

use crate::store::Table;

#[derive(Debug, Clone, Parser)]
#[command(name = "classroom-quiz", about = "Run live classroom quiz sessions over websockets")]
pub struct Opt {
    #[arg(long, default_value = "127.0.0.1:9001")]
    pub addr: String,

    #[arg(long, default_value = "classroom.sqlite", help = "SQLite file, or :memory:")]
    pub database: String,

    #[arg(long, default_value = "log")]
    pub log_dir: PathBuf,

    #[arg(long, default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    #[arg(long, env = "CLASSROOM_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,

    #[arg(long = "import", help = "Quiz pack JSON file to import at start")]
    pub imports: Vec<PathBuf>,

    #[arg(long, default_value_t = 10, help = "Session code draws before giving up")]
    pub code_attempts: usize,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    #[arg(long, default_value_t = 2000)]
    pub answer_poll_ms: u64,

    #[arg(long, default_value_t = 3000)]
    pub session_poll_ms: u64,

    #[arg(long, default_value_t = 5000)]
    pub participant_poll_ms: u64,

    #[arg(long, default_value_t = 3)]
    pub resubscribe_attempts: u32,

    #[arg(long, default_value_t = 5000)]
    pub resubscribe_delay_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .parse()
        .map_err(|_| format!("unknown log level {level:?}, expected off, error, warn, info, debug or trace"))
}

/// Intervals and retry bounds for [`crate::sync::ClientSyncEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub answer_poll: Duration,
    pub session_poll: Duration,
    pub participant_poll: Duration,
    /// Failed resubscriptions in a row before a feed settles on polling.
    pub resubscribe_attempts: u32,
    pub resubscribe_delay: Duration,
    pub tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            answer_poll: Duration::from_millis(2000),
            session_poll: Duration::from_millis(3000),
            participant_poll: Duration::from_millis(5000),
            resubscribe_attempts: 3,
            resubscribe_delay: Duration::from_millis(5000),
            tick: Duration::from_millis(1000),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self, table: Table) -> Duration {
        match table {
            Table::Answers => self.answer_poll,
            Table::Participants => self.participant_poll,
            _ => self.session_poll,
        }
    }
}

impl From<&SyncArgs> for SyncConfig {
    fn from(args: &SyncArgs) -> Self {
        SyncConfig {
            answer_poll: Duration::from_millis(args.answer_poll_ms),
            session_poll: Duration::from_millis(args.session_poll_ms),
            participant_poll: Duration::from_millis(args.participant_poll_ms),
            resubscribe_attempts: args.resubscribe_attempts,
            resubscribe_delay: Duration::from_millis(args.resubscribe_delay_ms),
            tick: Duration::from_millis(args.tick_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub code_attempts: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig { code_attempts: 10 }
    }
}

impl From<&Opt> for LifecycleConfig {
    fn from(opt: &Opt) -> Self {
        LifecycleConfig {
            code_attempts: opt.code_attempts,
        }
    }
}

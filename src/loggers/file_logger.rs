use std::path::{Path, PathBuf};

use log::{info, LevelFilter};
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use thiserror::Error;

const PATTERN: &str = "{d(%H:%M:%S)(utc)} {l} - {m}\n";

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid logger config: {0}")]
    Config(#[from] log4rs::config::runtime::ConfigErrors),

    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

/// `<dir>/<UTC date>.log`.
pub fn log_file_path(dir: &Path) -> PathBuf {
    let current_date = chrono::offset::Utc::now().date_naive().to_string();
    dir.join(format!("{}.log", current_date))
}

/// Logs to a dated file under `dir` and to the console.
pub fn init_file_logger(dir: &Path, level: LevelFilter) -> Result<(), LoggerError> {
    let path = log_file_path(dir);

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(&path)
        .map_err(|source| LoggerError::File {
            path: path.clone(),
            source,
        })?;
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(
            Root::builder()
                .appender("logfile")
                .appender("console")
                .build(level),
        )?;

    log4rs::init_config(config)?;
    info!("File logger initialized at {}", path.display());

    Ok(())
}

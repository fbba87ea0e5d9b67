//! Various utility and helper functions shared by the library and the binary.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Once,
};

use bitcoin::OutPoint;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use crate::error::CoinControlError;

/// Name of the per-session log file written inside the data directory.
pub const LOG_FILE_NAME: &str = "debug.log";

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {M} - {m}{n}";

static LOGGER: Once = Once::new();

/// Get the coin control data directory. Default: `~/.coincontrol`.
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".coincontrol")
}

/// Sets up the logger with a stderr console appender and a `debug.log` file appender.
///
/// The file lives at `<data_dir>/debug.log`. If the file appender cannot be created,
/// logging falls back to the console alone. Calling this more than once is a no-op.
pub fn setup_logger(filter: LevelFilter, data_dir: Option<PathBuf>) {
    LOGGER.call_once(|| {
        let data_dir = data_dir.unwrap_or_else(get_data_dir);
        let log_path = data_dir.join(LOG_FILE_NAME);

        // Stdout carries command output only.
        let console = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build();

        let mut builder =
            Config::builder().appender(Appender::builder().build("console", Box::new(console)));

        match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&log_path)
        {
            Ok(file) => {
                builder = builder
                    .appender(Appender::builder().build("file", Box::new(file)))
                    .logger(
                        Logger::builder()
                            .appender("file")
                            .build("coincontrol", filter),
                    );
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", log_path.display(), e),
        }

        match builder.build(Root::builder().appender("console").build(filter)) {
            Ok(config) => {
                if let Err(e) = log4rs::init_config(config) {
                    eprintln!("Logger already initialized: {}", e);
                }
            }
            Err(e) => eprintln!("Invalid logger config: {}", e),
        }
    });
}

/// Reads a flat `key = value` TOML file into a map.
///
/// Section headers, comments and blank lines are skipped. Surrounding quotes are
/// stripped from values.
pub fn parse_toml(file_path: &Path) -> io::Result<HashMap<String, String>> {
    let file = File::open(file_path)?;
    let reader = io::BufReader::new(file);
    let mut fields = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    }

    Ok(fields)
}

/// Parses a config value, falling back to `default` when missing or mis-typed.
pub fn parse_field<T: FromStr>(value: Option<&String>, default: T) -> T {
    value
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Parses a `txid:vout` string.
pub fn parse_outpoint(s: &str) -> Result<OutPoint, CoinControlError> {
    OutPoint::from_str(s.trim()).map_err(|_| CoinControlError::InvalidOutPoint(s.to_string()))
}

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::errors::*;

// ISO 8601 timestamp, color coded level tag, module path
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

fn build_config(level: LevelFilter) -> Result<log4rs::Config, Error> {
    // stdout is reserved for the JSON report.
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    log4rs::Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| Error::LoggingFailure(format!("{}", e)))
}

/// Installs the global logger. Can only succeed once per process.
pub fn init_logging(level: LevelFilter) -> Result<log4rs::Handle, Error> {
    let config = build_config(level)?;
    log4rs::init_config(config).map_err(|e| Error::LoggingFailure(format!("{}", e)))
}

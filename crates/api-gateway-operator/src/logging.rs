use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::writer::MakeWriterExt as _,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {}", directory.display()))]
    InitFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("failed to set the global subscriber"))]
    InitSubscriber { source: TryInitError },
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// We encourage it to be the application name plus `_LOG`, e.g. `API_GATEWAY_LOG`.
/// If no environment variable is provided, the maximum log level is set to INFO.
///
/// Log output can be copied to a file by setting `{env}_DIRECTORY` (e.g. `API_GATEWAY_DIRECTORY`)
/// to a directory path. This file will be rotated regularly.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(env)
        .from_env_lossy();

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let appender = file_appender(file_appender_directory.as_deref(), app_name)?;

    // `None` discards the copy.
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stdout.and(appender));
    Registry::default()
        .with(filter)
        .with(fmt)
        .try_init()
        .context(InitSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}

/// Builds the rolling file appender writing `{app_name}.log` files into
/// `directory`, if one is given.
fn file_appender(directory: Option<&Path>, app_name: &str) -> Result<Option<RollingFileAppender>> {
    directory
        .map(|log_dir| {
            RollingFileAppender::builder()
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(log_dir)
                .context(InitFileAppenderSnafu { directory: log_dir })
        })
        .transpose()
}

use std::str::FromStr;
use crate::config::LoggingConfig;

/// Installs the global logger.
///
/// An explicit `RUST_LOG` hands control to `env_logger`; otherwise log lines
/// go to stderr and, if configured, to a file. `verbose` raises the level to
/// debug.
pub fn setup_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_default_env().try_init()?;
        return Ok(());
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::from_str(&config.level).unwrap_or(log::LevelFilter::Warn)
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // HTTP client internals stay at warn
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Some(ref path) = config.output {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

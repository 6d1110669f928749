use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};

/// Sends log records to stderr as `[HH:MM:SS LEVEL] message`.
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    let colors = ColoredLevelConfig::default()
        .info(Color::Green)
        .debug(Color::Cyan);
    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {:>5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

/// Log level from the `--verbose` count and the `--quiet` flag.
pub fn level_filter(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Warn;
    }
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

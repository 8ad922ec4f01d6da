use log::LevelFilter;

/// `Info` by default, `Debug` at one `-v`, `Trace` at two or more.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut logger = env_logger::Builder::new();
    logger.format_timestamp_millis();
    logger.filter(None, level);
    logger.init();
}

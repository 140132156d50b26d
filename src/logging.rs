//! Logging Setup

/// Installs the `env_logger` backend.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// when `verbose`. Warnings and errors carry their level as a prefix.
/// Fails if a logger is already installed.
pub fn init_logging(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .try_init()
}

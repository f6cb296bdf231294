use env_logger::{Builder, Env};
use log::{info, Level};
use std::io::Write;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1B[1;31m", // Bold Red
        Level::Warn => "\x1B[1;33m",  // Bold Yellow
        Level::Info => "\x1B[1;32m",  // Bold Green
        Level::Debug => "\x1B[1;36m", // Bold Cyan
        Level::Trace => "\x1B[1;35m", // Bold Magenta
    }
}

/// Colored single-line logger. Defaults to `info` for the portal and `warn`
/// for dependencies; `RUST_LOG` overrides both.
pub fn setup_logger() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn,amptech=info"));

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}{}\x1B[0m [{}:{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                level_color(record.level()),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    info!("Logger initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_and_warnings_get_distinct_colors() {
        assert_ne!(level_color(Level::Error), level_color(Level::Warn));
        assert_eq!(level_color(Level::Info), "\x1B[1;32m");
    }
}

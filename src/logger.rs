//! Logging and verbosity control for the generator.
//!
//! Provides a global logger with three verbosity levels:
//! - Quiet: Only written artifact paths and errors
//! - Normal: Progress messages without prefixes (default)
//! - Verbose: Timestamped colored logs with pipeline details
//!
//! The logger falls back to Normal without colors when `init` was never
//! called.

use std::sync::OnceLock;
use std::time::Instant;

/// Verbosity level for controlling output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Only written artifact paths and errors
    Quiet,
    /// Progress messages without prefixes (default)
    Normal,
    /// Timestamped colored logs with details
    Verbose,
}

/// Severity of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[34m",
            Level::Debug => "\x1b[90m",
        }
    }

    /// Prefix used outside verbose mode.
    fn plain_prefix(self) -> &'static str {
        match self {
            Level::Error => "Error: ",
            Level::Warn => "Warning: ",
            Level::Info | Level::Debug => "",
        }
    }

    /// Lowest verbosity at which the level is shown.
    fn threshold(self) -> VerbosityLevel {
        match self {
            Level::Error => VerbosityLevel::Quiet,
            Level::Warn | Level::Info => VerbosityLevel::Normal,
            Level::Debug => VerbosityLevel::Verbose,
        }
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Set by `init`; elapsed time reads 0 before that.
static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(Debug)]
pub struct Logger {
    level: VerbosityLevel,
    colors_enabled: bool,
}

impl Logger {
    /// Initialize the global logger with the specified verbosity level.
    ///
    /// Returns `false` when a logger was already installed (explicitly or by
    /// an earlier fallback); the first configuration wins.
    pub fn init(level: VerbosityLevel, no_color: bool) -> bool {
        let colors_enabled = !no_color
            && std::env::var("NO_COLOR").is_err()
            && atty::is(atty::Stream::Stdout);

        START_TIME.set(Instant::now()).ok();
        LOGGER
            .set(Logger {
                level,
                colors_enabled,
            })
            .is_ok()
    }

    pub fn instance() -> &'static Logger {
        LOGGER.get_or_init(|| Logger {
            level: VerbosityLevel::Normal,
            colors_enabled: false,
        })
    }

    fn elapsed(&self) -> f64 {
        START_TIME
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn is_verbose(&self) -> bool {
        self.level == VerbosityLevel::Verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.level == VerbosityLevel::Quiet
    }

    fn shows(&self, level: Level) -> bool {
        self.level as u8 >= level.threshold() as u8
    }

    /// Formats `msg` for the current verbosity, `None` when it is filtered.
    fn format(&self, level: Level, msg: &str) -> Option<String> {
        if !self.shows(level) {
            return None;
        }
        if !self.is_verbose() {
            return Some(format!("{}{}", level.plain_prefix(), msg));
        }
        let elapsed = self.elapsed();
        Some(if self.colors_enabled {
            format!(
                "\x1b[90m[{:.2}s]\x1b[0m {}[{}]\x1b[0m {}",
                elapsed,
                level.color(),
                level.tag(),
                msg
            )
        } else {
            format!("[{:.2}s] [{}] {}", elapsed, level.tag(), msg)
        })
    }

    fn emit(&self, level: Level, msg: &str) {
        if let Some(line) = self.format(level, msg) {
            if level == Level::Error {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }

    /// Log an error message (always displayed, on stderr).
    pub fn error(&self, msg: &str) {
        self.emit(Level::Error, msg);
    }

    /// Log a warning message (normal and verbose modes).
    pub fn warn(&self, msg: &str) {
        self.emit(Level::Warn, msg);
    }

    /// Report a written artifact: the bare path in quiet mode, a `Saved:`
    /// line otherwise.
    pub fn output(&self, path: &str) {
        if self.is_quiet() {
            println!("{}", path);
        } else {
            self.emit(Level::Info, &format!("Saved: {}", path));
        }
    }

    /// Log an info message (displayed in normal mode and above).
    pub fn info(&self, msg: &str) {
        self.emit(Level::Info, msg);
    }

    /// Log a debug message (displayed only in verbose mode).
    pub fn debug(&self, msg: &str) {
        self.emit(Level::Debug, msg);
    }
}

pub fn error(msg: &str) {
    Logger::instance().error(msg);
}

pub fn warn(msg: &str) {
    Logger::instance().warn(msg);
}

/// Report a written artifact path.
pub fn output(path: &str) {
    Logger::instance().output(path);
}

pub fn info(msg: &str) {
    Logger::instance().info(msg);
}

pub fn debug(msg: &str) {
    Logger::instance().debug(msg);
}

pub fn is_verbose() -> bool {
    Logger::instance().is_verbose()
}

pub fn is_quiet() -> bool {
    Logger::instance().is_quiet()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(level: VerbosityLevel) -> Logger {
        Logger {
            level,
            colors_enabled: false,
        }
    }

    #[test]
    fn test_verbosity_level_ordering() {
        assert!((VerbosityLevel::Quiet as i32) < (VerbosityLevel::Normal as i32));
        assert!((VerbosityLevel::Normal as i32) < (VerbosityLevel::Verbose as i32));
    }

    #[test]
    fn test_logger_is_verbose() {
        assert!(!logger(VerbosityLevel::Quiet).is_verbose());
        assert!(!logger(VerbosityLevel::Normal).is_verbose());
        assert!(logger(VerbosityLevel::Verbose).is_verbose());
    }

    #[test]
    fn test_logger_is_quiet() {
        assert!(logger(VerbosityLevel::Quiet).is_quiet());
        assert!(!logger(VerbosityLevel::Normal).is_quiet());
        assert!(!logger(VerbosityLevel::Verbose).is_quiet());
    }

    #[test]
    fn test_quiet_keeps_only_errors() {
        let quiet = logger(VerbosityLevel::Quiet);
        assert_eq!(quiet.format(Level::Error, "boom").as_deref(), Some("Error: boom"));
        assert!(quiet.format(Level::Warn, "w").is_none());
        assert!(quiet.format(Level::Info, "i").is_none());
        assert!(quiet.format(Level::Debug, "d").is_none());
    }

    #[test]
    fn test_normal_prefixes_warnings_and_hides_debug() {
        let normal = logger(VerbosityLevel::Normal);
        assert_eq!(
            normal.format(Level::Warn, "Unknown group ID: 9").as_deref(),
            Some("Warning: Unknown group ID: 9")
        );
        assert_eq!(normal.format(Level::Info, "Basemap").as_deref(), Some("Basemap"));
        assert!(normal.format(Level::Debug, "d").is_none());
    }

    #[test]
    fn test_verbose_tags_every_level() {
        let verbose = logger(VerbosityLevel::Verbose);
        let line = verbose.format(Level::Debug, "sampling").unwrap();
        assert!(line.starts_with('['));
        assert!(line.ends_with("[DEBUG] sampling"));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_uninitialized_instance_does_not_panic() {
        debug("debug from test");
        let _ = Logger::instance().is_quiet();
    }

    #[test]
    fn test_elapsed_returns_value() {
        let elapsed = logger(VerbosityLevel::Verbose).elapsed();
        assert!(elapsed >= 0.0);
    }
}

use crate::config::{Config, RustEnv};
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies muted unless running at Trace. simplelog matches these as
/// module path prefixes, so `tower` also covers `tower_http`.
const FILTERED_MODULES: &[&str] = &["redis", "hyper", "tower", "axum"];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger.
    ///
    /// Development gets colored, mixed stdout/stderr output. Staging and
    /// production write plain lines to stderr with the module path on every
    /// line, which is what log collectors expect.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let env = config.runtime_env();
        let (mode, color) = Self::terminal_for(&env);

        TermLogger::init(
            config.log_level_filter,
            Self::build_log_config(config.log_level_filter, &env),
            mode,
            color,
        )
    }

    fn terminal_for(env: &RustEnv) -> (TerminalMode, ColorChoice) {
        match env {
            RustEnv::Development => (TerminalMode::Mixed, ColorChoice::Auto),
            RustEnv::Staging | RustEnv::Production => (TerminalMode::Stderr, ColorChoice::Never),
        }
    }

    fn filtered_modules(level: LevelFilter) -> &'static [&'static str] {
        if level == LevelFilter::Trace {
            &[]
        } else {
            FILTERED_MODULES
        }
    }

    fn build_log_config(level: LevelFilter, env: &RustEnv) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if *env != RustEnv::Development {
            builder.set_target_level(LevelFilter::Error);
        }

        for module in Self::filtered_modules(level) {
            builder.add_filter_ignore_str(module);
        }

        builder.build()
    }
}

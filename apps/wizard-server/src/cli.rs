//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wizard-server",
    about = "Wizard workflow engine server",
    version,
    long_about = "Serves the wizard workflow engine over HTTP: step transitions, \
                  draft persistence and task hand-off for multi-step flows."
)]
pub struct Args {
    /// Path to a configuration file; WIZARD__* environment variables still apply
    #[arg(short, long, env = "WIZARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP server port, overriding configuration
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["wizard-server"]);
        assert!(args.config.is_none());
        assert_eq!(args.log_level, "info");
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "wizard-server",
            "--config",
            "config/wizard.toml",
            "--port",
            "9090",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.port, Some(9090));
        assert_eq!(args.log_level, "debug");
        assert!(args.json_logs);
    }
}

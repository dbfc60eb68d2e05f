//! Output formatter for human-readable and JSON output
//!
//! Success lines go to stdout, errors to stderr. In JSON mode the
//! transfer summary is printed as one JSON document and errors as
//! `{"error": ..., "causes": [...]}`.

use serde::Serialize;

use super::OutputConfig;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Formatter for CLI output
///
/// When JSON mode is enabled, all output is strict JSON without colors.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    /// Create a new formatter with the given configuration
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Check if colors are enabled
    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Print the result of a successful run
    ///
    /// JSON mode serializes `value`; human mode prints its `Display`
    /// form after a check mark. Quiet mode prints nothing.
    pub fn summary<T: Serialize + std::fmt::Display>(&self, value: &T) {
        if self.config.quiet {
            return;
        }

        if self.config.json {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing output: {e}"),
            }
        } else {
            println!("{}", self.mark('✓', GREEN, &value.to_string()));
        }
    }

    /// Print an error and its causes
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, err: &anyhow::Error) {
        if self.config.json {
            let causes: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
            let error = serde_json::json!({
                "error": err.to_string(),
                "causes": causes,
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| format!("{err:#}"))
            );
        } else {
            eprintln!("{}", self.render_error(err));
        }
    }

    fn render_error(&self, err: &anyhow::Error) -> String {
        let mut out = self.mark('✗', RED, &err.to_string());
        for cause in err.chain().skip(1) {
            out.push_str(&format!("\n  caused by: {cause}"));
        }
        out
    }

    fn mark(&self, symbol: char, color: &str, message: &str) -> String {
        if self.colors_enabled() {
            format!("{color}{symbol}{RESET} {message}")
        } else {
            format!("{symbol} {message}")
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

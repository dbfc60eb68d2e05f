//! Progress bar for transfers
//!
//! The engine reports plaintext bytes through [`sc_core::Progress`]; this
//! wrapper forwards them to an `indicatif` bar unless output is quiet,
//! JSON or `--no-progress`.

use sc_core::Progress;

use super::OutputConfig;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const TEMPLATE_PLAIN: &str = "{spinner} [{bar:40}] {bytes}/{total_bytes} ({eta})";

/// Progress bar wrapper
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a progress bar; the length is set when the transfer starts
    pub fn new(config: OutputConfig, total: u64) -> Self {
        let bar = if config.quiet || config.json || config.no_progress {
            None
        } else {
            let bar = indicatif::ProgressBar::new(total);
            let template = if config.no_color {
                TEMPLATE_PLAIN
            } else {
                TEMPLATE
            };
            // A bad template only loses the styling
            if let Ok(style) = indicatif::ProgressStyle::default_bar().template(template) {
                bar.set_style(style.progress_chars("#>-"));
            }
            Some(bar)
        };

        Self { bar }
    }

    /// Finish and clear the progress bar
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    #[cfg(test)]
    fn is_visible(&self) -> bool {
        self.bar.is_some()
    }

    #[cfg(test)]
    fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(|bar| bar.position())
    }
}

impl Progress for ProgressBar {
    fn start(&self, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
            bar.set_position(0);
        }
    }

    fn advance(&self, bytes: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_quiet_mode() {
        let config = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        let bar = ProgressBar::new(config, 100);
        assert!(!bar.is_visible());
        bar.advance(10);
        assert_eq!(bar.position(), None);
    }

    #[test]
    fn test_progress_bar_json_mode() {
        let config = OutputConfig {
            json: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(config, 100).is_visible());
    }

    #[test]
    fn test_progress_bar_no_progress() {
        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(config, 100).is_visible());
    }

    #[test]
    fn test_progress_bar_tracks_engine_updates() {
        let bar = ProgressBar::new(OutputConfig::default(), 0);
        assert!(bar.is_visible());

        bar.start(100);
        bar.advance(40);
        bar.advance(25);
        assert_eq!(bar.position(), Some(65));
        bar.finish_and_clear();
    }
}

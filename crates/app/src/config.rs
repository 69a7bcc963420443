//! Command line and environment handling for the `mathsolver` binary.

use std::path::PathBuf;

use clap::Parser;
use solver_core::{Level, SettlementPolicy, Settings};

#[derive(Debug, Parser)]
#[command(name = "mathsolver")]
#[command(version)]
#[command(about = "Solve math problems from text or images in the terminal")]
#[command(after_help = "With no --question or --image the interactive terminal UI starts.\n\
Log verbosity follows RUST_LOG.")]
pub struct Cli {
    /// Solve one text question and print the result
    #[arg(long, value_name = "TEXT", conflicts_with = "image")]
    pub question: Option<String>,

    /// Solve the question in an image file and print the result
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Base URL of the solver service
    #[arg(long, value_name = "URL", env = "MATHSOLVER_API_URL")]
    pub api_url: Option<String>,

    /// Locale sent with text questions
    #[arg(long, env = "MATHSOLVER_LOCALE")]
    pub locale: Option<String>,

    /// Explanation level: auto, beginner, intermediate or advanced
    #[arg(long, env = "MATHSOLVER_LEVEL")]
    pub level: Option<Level>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", env = "MATHSOLVER_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Which reply wins when both modes are in flight: latest_issued or last_settled
    #[arg(long, value_name = "POLICY", env = "MATHSOLVER_SETTLEMENT_POLICY")]
    pub settlement_policy: Option<SettlementPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Tui,
    Question(String),
    Image(PathBuf),
}

impl Cli {
    pub fn run_mode(&self) -> RunMode {
        match (&self.question, &self.image) {
            (Some(question), _) => RunMode::Question(question.clone()),
            (None, Some(path)) => RunMode::Image(path.clone()),
            (None, None) => RunMode::Tui,
        }
    }

    /// Layers flag and `MATHSOLVER_*` values over the stored settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(url) = &self.api_url {
            settings.api_base_url = url.clone();
        }
        if let Some(locale) = &self.locale {
            settings.locale = locale.clone();
        }
        if let Some(level) = self.level {
            settings.level = level;
        }
        if let Some(secs) = self.timeout_secs {
            settings.request_timeout_secs = secs;
        }
        if let Some(policy) = self.settlement_policy {
            settings.settlement_policy = policy;
        }
        settings.normalize();
    }
}

/// What to write back to storage: fields edited during the run, stored values
/// for everything else, so overrides never become persistent.
pub fn persistable(stored: &Settings, at_start: &Settings, current: &Settings) -> Settings {
    fn pick<T: Clone + PartialEq>(stored: &T, at_start: &T, current: &T) -> T {
        if current == at_start {
            stored.clone()
        } else {
            current.clone()
        }
    }

    Settings {
        api_base_url: pick(&stored.api_base_url, &at_start.api_base_url, &current.api_base_url),
        locale: pick(&stored.locale, &at_start.locale, &current.locale),
        level: pick(&stored.level, &at_start.level, &current.level),
        request_timeout_secs: pick(
            &stored.request_timeout_secs,
            &at_start.request_timeout_secs,
            &current.request_timeout_secs,
        ),
        settlement_policy: pick(
            &stored.settlement_policy,
            &at_start.settlement_policy,
            &current.settlement_policy,
        ),
    }
}

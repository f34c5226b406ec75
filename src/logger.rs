use std::env;
use tracing_subscriber::EnvFilter;

const CI_VAR: &str = "CI";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// CI collects structured logs, whatever was asked for.
    pub fn effective(self) -> LogFormat {
        match env::var_os(CI_VAR) {
            Some(_) => LogFormat::Json,
            None => self,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber, `RUST_LOG` drives the filter.
///
/// Returns false when a subscriber was already installed.
pub fn init(format: LogFormat) -> bool {
    let result = match format.effective() {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(env_filter())
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter()).try_init(),
    };

    result.is_ok()
}

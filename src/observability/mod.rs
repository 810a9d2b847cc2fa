use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide telemetry handle. Owns nothing beyond the subscriber
/// initialisation today, but keeps probe recording behind one seam.
#[derive(Debug, Clone)]
pub struct Telemetry;

impl Telemetry {
    /// Initialises the tracing subscriber exactly once and returns the handle.
    ///
    /// # Errors
    /// Returns an error when subscriber registration fails.
    pub fn new() -> Result<Self> {
        init_tracing()?;
        Ok(Self)
    }

    pub fn record_ready_probe(&self) {
        tracing::debug!("service ready probe");
    }

    pub fn record_live_probe(&self) {
        tracing::debug!("service live probe");
    }
}

fn init_tracing() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_initialises_only_once() {
        let first = Telemetry::new();
        let second = Telemetry::new();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}

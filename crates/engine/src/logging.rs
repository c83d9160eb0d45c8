use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::EngineError;

/// Install a formatting subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns `Ok(false)` without touching anything when a global subscriber
/// is already installed.
pub fn init(default_filter: &str) -> Result<bool, EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| EngineError::Config(format!("invalid log filter `{default_filter}`: {e}")))?,
    };

    match tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
    {
        Ok(()) => {
            tracing::debug!(filter = default_filter, "logging initialized");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_noop() -> Result<(), EngineError> {
        let _first = init("gradepoint=debug,info")?;
        assert!(!init("info")?);
        Ok(())
    }
}

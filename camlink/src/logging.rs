//! Tracing subscriber setup

use crate::CamlinkError;
use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` or `info`
/// depending on `debug`. Fails if a global subscriber is already installed.
pub fn init_logging(debug: bool) -> Result<(), CamlinkError> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| CamlinkError::Initialization {
            reason: format!("failed to install tracing subscriber: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_logging(false);
        let second = init_logging(true);
        assert!(matches!(second, Err(CamlinkError::Initialization { .. })));
    }
}

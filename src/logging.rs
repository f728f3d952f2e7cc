//! Structured log bootstrap for binaries and tests embedding the crate.
//!
//! The library itself only emits `tracing` events (targets `proxy`, `http`
//! and `fetch`); installing a subscriber is the host's call. These helpers
//! cover the common case without fighting a subscriber the host already
//! installed.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Default directives when `RUST_LOG` is unset: the crate's own events at
/// `info`, everything else at `warn`.
const DEFAULT_DIRECTIVES: &str = "warn,socks_fetch=info,proxy=info,http=info,fetch=info";

/// Install a global subscriber honoring `RUST_LOG`. No-op on repeat calls
/// and when the host already installed one.
pub fn init() {
    init_with_filter(None);
}

/// Like [`init`], but `directives` (EnvFilter syntax) takes precedence over
/// `RUST_LOG` when given.
pub fn init_with_filter(directives: Option<&str>) {
    INSTALLED.get_or_init(|| {
        let filter = match directives {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        };
        // try_init keeps this cooperative: losing the race to a host
        // subscriber is fine, ours just stays uninstalled.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_noop() {
        init();
        init_with_filter(Some("socks_fetch=debug"));
        init();
        tracing::info!(target = "fetch", "log after repeated init");
    }
}

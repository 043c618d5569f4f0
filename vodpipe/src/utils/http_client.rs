//! Shared `reqwest` client construction.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

/// Install the aws-lc-rs crypto provider for rustls once per process.
///
/// reqwest is built without a bundled provider, so this must run before the
/// first TLS connection.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used for manifests and segment transfers.
///
/// Only the connect phase is bounded. Segment bodies can take arbitrarily long
/// to stream, so there is no overall request timeout.
pub fn build_client(user_agent: &str, connect_timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .pool_max_idle_per_host(4)
        .tcp_nodelay(true);

    if connect_timeout > Duration::ZERO {
        builder = builder.connect_timeout(connect_timeout);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

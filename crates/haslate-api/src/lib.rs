// haslate-api: Async client for the Home Assistant websocket API

pub mod client;
pub mod error;
pub mod protocol;
pub mod state;
mod websocket;

pub use client::{HubClient, HubEvent, HubEventStream, HubHandle, HubSettings, ReconnectConfig};
pub use error::Error;
pub use protocol::{HassState, ServiceCall};
pub use state::{ConnectionState, ConnectionTracker};

/// Install the process-wide rustls crypto provider used for `wss://` hubs.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}

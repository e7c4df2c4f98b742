use thiserror::Error;

/// Top-level error type for the `haslate-api` crate.
///
/// Transport and protocol failures are recovered inside the session loop;
/// only authentication and command failures travel further.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub refused the access token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Websocket connect, read or write failure.
    #[error("Websocket transport error: {0}")]
    Transport(String),

    /// The hub closed the connection.
    #[error("Connection closed by hub: {reason}")]
    Closed { reason: String },

    /// A connect, auth or snapshot reply did not arrive in time.
    #[error("Timed out waiting for {phase} after {timeout_secs}s")]
    Timeout {
        phase: &'static str,
        timeout_secs: u64,
    },

    // ── Protocol ────────────────────────────────────────────────────
    /// The hub sent something the handshake did not expect.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// JSON deserialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Commands ────────────────────────────────────────────────────
    /// Commands are only accepted while subscribed.
    #[error("Not connected to the hub")]
    NotConnected,

    /// The outbound command queue is full.
    #[error("Command queue is full")]
    QueueFull,

    /// The hub answered a command with `success: false`.
    #[error("Command rejected ({code}): {message}")]
    CommandRejected { code: String, message: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Error {
    /// Returns `true` if the hub rejected the credentials. Reconnecting
    /// with the same token cannot help.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejected_tokens_are_auth_failures() {
        assert!(!Error::Transport("reset".into()).is_auth_failure());
        assert!(
            !Error::Timeout {
                phase: "auth",
                timeout_secs: 10
            }
            .is_auth_failure()
        );
        assert!(
            Error::Authentication {
                message: "bad token".into()
            }
            .is_auth_failure()
        );
    }
}

// ── Core error types ──
//
// User-facing errors from haslate-core. Transport-level failures never get
// here: the hub session recovers from them itself. What remains is what
// the dashboard has to show to a person.

use thiserror::Error;

use crate::model::EntityId;

/// Why a configuration could not be turned into a layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("page {page} item {index} is out of bounds: {reason}")]
    OutOfBounds {
        page: usize,
        index: usize,
        reason: String,
    },

    #[error("a {width}x{height} screen cannot hold a {columns}x{rows} grid")]
    ScreenTooSmall {
        width: u32,
        height: u32,
        columns: u16,
        rows: u16,
    },

    #[error("page {page} item {index} is invalid: {reason}")]
    InvalidWidget {
        page: usize,
        index: usize,
        reason: String,
    },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Store errors ─────────────────────────────────────────────────
    #[error("{id} is in the reserved local namespace")]
    ReservedNamespace { id: EntityId },

    #[error("{id} is not a local pseudo-entity")]
    NotLocal { id: EntityId },

    // ── Configuration errors ─────────────────────────────────────────
    #[error(transparent)]
    Config(#[from] haslate_config::ConfigError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

impl CoreError {
    /// Whether this is a problem with the configuration document or layout.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Layout(_))
    }
}

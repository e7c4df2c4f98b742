//! Dashboard core for haslate: everything between the hub session in
//! `haslate-api` and a screen.
//!
//! - **[`EntityStore`]**: the single authoritative map from entity id to
//!   latest state. Lock-free reads through `ArcSwap`, serialized writes,
//!   synchronous change listeners plus a `watch` version counter for async
//!   waiters. Hub entities and local sensor pseudo-entities (`local.*`)
//!   live side by side.
//!
//! - **Layout** ([`layout::resolve`]): maps each page's logical grid onto
//!   screen pixels and builds the [`Widget`] behind every item.
//!
//! - **[`BindingEngine`]**: connects a layout to the store. Store changes
//!   mark the widgets bound to them dirty; the foreground loop pulls
//!   [`DrawCommand`]s and forwards taps, which become hub service calls
//!   through a [`CommandSink`] or local actions.
//!
//! - **[`Controller`]**: owns the configuration, store, engine, hub session
//!   and sensor poller, and implements hot reload.

pub mod controller;
pub mod convert;
pub mod engine;
pub mod error;
pub mod layout;
pub mod model;
pub mod sensors;
pub mod store;
pub mod widget;

// ── Primary re-exports ──────────────────────────────────────────────
pub use controller::{Controller, ControllerOptions, DashboardStatus, ReloadOutcome};
pub use engine::{Activation, BindingEngine, CommandSink, DrawCommand};
pub use error::{CoreError, LayoutError};
pub use layout::{Layout, Point, Rect, ScreenSize};
pub use model::{EntityEntry, EntityId, EntityState, Origin, Scalar};
pub use sensors::{BatteryReading, LocalSensors, NoSensors, WifiReading};
pub use store::{EntityStore, ListenerId};
pub use widget::{LocalAction, Tone, Widget, WidgetContent};

// Session-level types consumers need alongside the controller.
pub use haslate_api::{ConnectionState, ReconnectConfig};

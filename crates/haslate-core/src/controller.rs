// ── Dashboard controller ──
//
// Owns the whole dashboard: configuration, entity store, binding engine,
// the hub session with its bridge task, and the local sensor poller. The
// foreground loop drives it through `frame`, `activate` and `reload`.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use haslate_api::{
    ConnectionState, ConnectionTracker, HubClient, HubEvent, HubEventStream, HubHandle,
    HubSettings, ReconnectConfig,
};
use haslate_config::{Config, HubEndpoint};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{Activation, BindingEngine, CommandSink, DrawCommand};
use crate::error::CoreError;
use crate::layout::{Layout, Point, ScreenSize, resolve};
use crate::model::EntityState;
use crate::sensors::{self, LocalSensors};
use crate::store::EntityStore;
use crate::widget::LocalAction;

/// Startup parameters that are not part of the configuration document.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub config_path: PathBuf,
    pub screen: ScreenSize,
    /// How often local sensors are sampled. Default: 1s.
    pub sensor_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl ControllerOptions {
    pub fn new(config_path: impl Into<PathBuf>, screen: ScreenSize) -> Self {
        Self {
            config_path: config_path.into(),
            screen,
            sensor_interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Problems the dashboard should show to a person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DashboardStatus {
    #[default]
    Ok,
    /// The hub refused the token. Cleared by a reload that changes it.
    AuthFailed(String),
    /// The last reload failed; the previous configuration is still active.
    ConfigError(String),
}

/// What a successful reload changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub hub_restarted: bool,
    /// Device-level settings differ. Applying them is up to the host.
    pub system_changed: bool,
}

// ── Hub session ──────────────────────────────────────────────────────

struct HubSession {
    handle: HubHandle,
    bridge: JoinHandle<()>,
}

impl HubSession {
    fn spawn(
        endpoint: HubEndpoint,
        options: &ControllerOptions,
        tracker: &ConnectionTracker,
        store: &Arc<EntityStore>,
        status: &watch::Sender<DashboardStatus>,
        cancel: CancellationToken,
    ) -> Self {
        info!(url = %endpoint.url, "starting hub session");
        let mut settings = HubSettings::new(endpoint.url, endpoint.token);
        settings.reconnect = options.reconnect.clone();

        let (handle, events) = HubClient::spawn(settings, tracker.clone(), cancel);
        let bridge = tokio::spawn(bridge_task(events, Arc::clone(store), status.clone()));
        Self { handle, bridge }
    }

    fn sink(&self) -> Arc<dyn CommandSink> {
        Arc::new(self.handle.clone())
    }

    /// Close the socket and wait for the session and its bridge to finish.
    /// The session must not be used afterwards.
    async fn stop(&mut self) {
        self.handle.join().await;
        if let Err(e) = (&mut self.bridge).await {
            warn!(error = %e, "bridge task ended abnormally");
        }
    }
}

/// Apply hub events to the store until the session ends.
async fn bridge_task(
    mut events: HubEventStream,
    store: Arc<EntityStore>,
    status: watch::Sender<DashboardStatus>,
) {
    while let Some(event) = events.next().await {
        match event {
            HubEvent::Snapshot(states) => {
                store.apply_snapshot(states.into_iter().map(EntityState::from));
            }
            HubEvent::StateChanged(state) => {
                if let Err(e) = store.apply_change(EntityState::from(state)) {
                    warn!(error = %e, "dropping state change");
                }
            }
            HubEvent::Connection(state) => {
                debug!(%state, "hub connection state");
                if matches!(
                    state,
                    ConnectionState::Reconnecting { .. } | ConnectionState::Disconnected
                ) {
                    store.mark_remote_stale();
                }
            }
            HubEvent::CommandResult { id, outcome } => match outcome {
                Ok(()) => debug!(id, "command accepted"),
                Err(e) => warn!(id, error = %e, "command failed"),
            },
            HubEvent::AuthRejected { message } => {
                error!(%message, "hub rejected the access token");
                status.send_replace(DashboardStatus::AuthFailed(message));
            }
        }
    }
    debug!("hub event stream ended");
}

// ── Controller ───────────────────────────────────────────────────────

/// The running dashboard.
pub struct Controller {
    options: ControllerOptions,
    config: Config,
    store: Arc<EntityStore>,
    engine: BindingEngine,
    tracker: ConnectionTracker,
    status: watch::Sender<DashboardStatus>,
    cancel: CancellationToken,
    session: HubSession,
    sensor_task: JoinHandle<()>,
}

impl Controller {
    /// Load the configuration, lay it out and start the background tasks.
    ///
    /// Must be called from within a tokio runtime. The first hub connection
    /// attempt happens in the background.
    pub fn start(
        options: ControllerOptions,
        sensors: Arc<dyn LocalSensors>,
    ) -> Result<Self, CoreError> {
        let (config, layout, endpoint) = prepare(&options)?;

        let store = Arc::new(EntityStore::new());
        let tracker = ConnectionTracker::new();
        let (status, _) = watch::channel(DashboardStatus::Ok);
        let cancel = CancellationToken::new();

        let session = HubSession::spawn(
            endpoint,
            &options,
            &tracker,
            &store,
            &status,
            cancel.child_token(),
        );
        let engine = BindingEngine::new(layout, Arc::clone(&store), session.sink());
        let sensor_task = tokio::spawn(sensors::poll_task(
            sensors,
            Arc::clone(&store),
            options.sensor_interval,
            cancel.child_token(),
        ));

        info!(
            config = %options.config_path.display(),
            pages = engine.layout().page_count(),
            "dashboard started"
        );
        Ok(Self {
            options,
            config,
            store,
            engine,
            tracker,
            status,
            cancel,
            session,
            sensor_task,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn screen(&self) -> ScreenSize {
        self.options.screen
    }

    pub fn page_name(&self) -> Option<&str> {
        self.engine.page_name()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.tracker.current()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.subscribe()
    }

    pub fn status(&self) -> DashboardStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DashboardStatus> {
        self.status.subscribe()
    }

    // ── Drawing ──────────────────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        self.engine.is_dirty()
    }

    /// Draw commands for widgets that changed since the last frame.
    pub fn frame(&self) -> Vec<DrawCommand> {
        self.engine.take_frame()
    }

    /// Draw commands for the whole current page.
    pub fn full_frame(&self) -> Vec<DrawCommand> {
        self.engine.full_frame()
    }

    // ── Input ────────────────────────────────────────────────────────

    /// Handle a tap. `Break` means the user asked to quit.
    pub fn activate(&mut self, point: Point) -> ControlFlow<()> {
        match self.engine.activate_at(point) {
            Activation::Local(LocalAction::Quit) => return ControlFlow::Break(()),
            Activation::Local(LocalAction::NextPage) => self.engine.next_page(),
            Activation::Local(LocalAction::PreviousPage) => self.engine.previous_page(),
            Activation::Submitted { .. } | Activation::Dropped { .. } | Activation::Ignored => {}
        }
        ControlFlow::Continue(())
    }

    pub fn next_page(&mut self) {
        self.engine.next_page();
    }

    pub fn previous_page(&mut self) {
        self.engine.previous_page();
    }

    /// Lay the current configuration out for a new screen size. On error
    /// the previous layout stays active.
    pub fn resize(&mut self, screen: ScreenSize) -> Result<(), CoreError> {
        if screen == self.options.screen {
            return Ok(());
        }
        let layout = resolve(&self.config.application, screen)?;
        self.options.screen = screen;
        self.swap_engine(layout);
        Ok(())
    }

    // ── Reload ───────────────────────────────────────────────────────

    /// Re-read the configuration file and apply it.
    ///
    /// Any parse, validation or layout failure keeps the running
    /// configuration, records the error in [`status`](Self::status) and
    /// returns it. The hub session is restarted only when its endpoint
    /// changed.
    pub async fn reload(&mut self) -> Result<ReloadOutcome, CoreError> {
        let (config, layout, endpoint) = match prepare(&self.options) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "reload failed, keeping previous configuration");
                self.status
                    .send_replace(DashboardStatus::ConfigError(e.to_string()));
                return Err(e);
            }
        };

        let outcome = ReloadOutcome {
            hub_restarted: config.hub_changed(&self.config),
            system_changed: config.system_changed(&self.config),
        };

        if outcome.hub_restarted {
            self.session.stop().await;
            self.store.mark_remote_stale();
            self.session = HubSession::spawn(
                endpoint,
                &self.options,
                &self.tracker,
                &self.store,
                &self.status,
                self.cancel.child_token(),
            );
        }

        self.config = config;
        self.swap_engine(layout);

        self.status.send_if_modified(|status| {
            let clear = match status {
                DashboardStatus::Ok => false,
                DashboardStatus::AuthFailed(_) => outcome.hub_restarted,
                DashboardStatus::ConfigError(_) => true,
            };
            if clear {
                *status = DashboardStatus::Ok;
            }
            clear
        });

        info!(
            hub_restarted = outcome.hub_restarted,
            system_changed = outcome.system_changed,
            "configuration reloaded"
        );
        Ok(outcome)
    }

    /// Replace the binding engine, staying on the same page if it still
    /// exists. The old engine's store listener goes with it.
    fn swap_engine(&mut self, layout: Layout) {
        let page = self.engine.page_index();
        let mut engine = BindingEngine::new(layout, Arc::clone(&self.store), self.session.sink());
        engine.show_page(page);
        self.engine = engine;
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Cancel every background task and wait for them. The hub session
    /// closes its socket on the way out.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.session.stop().await;
        if let Err(e) = self.sensor_task.await {
            warn!(error = %e, "sensor task ended abnormally");
        }
        info!("dashboard stopped");
    }
}

/// Load, validate and lay out the configuration file.
fn prepare(options: &ControllerOptions) -> Result<(Config, Layout, HubEndpoint), CoreError> {
    let config = haslate_config::load(&options.config_path)?;
    let endpoint = config.hub_endpoint()?;
    let layout = resolve(&config.application, options.screen)?;
    Ok((config, layout, endpoint))
}

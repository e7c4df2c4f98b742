//! Foreground loop: terminal input, config-file changes and redraws.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Rect, Size},
};
use tracing::{info, warn};

use haslate_config::{ConfigError, ConfigWatcher};
use haslate_core::{
    ConnectionState, Controller, ControllerOptions, CoreError, DashboardStatus, DrawCommand,
    LocalSensors, Point, ScreenSize,
};

use crate::event::{Event, EventReader};
use crate::render::{self, ConfigProblem, StatusLine};
use crate::sysfs::SysfsSensors;
use crate::tui::Tui;

const TICK: Duration = Duration::from_millis(100);
/// Editors save in several steps; wait this long before reloading.
const SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    Reload,
    NextPage,
    PreviousPage,
}

fn key_action(key: KeyEvent) -> Option<KeyAction> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q') | KeyCode::Esc) => {
            Some(KeyAction::Quit)
        }
        (_, KeyCode::Char('r')) => Some(KeyAction::Reload),
        (_, KeyCode::Right | KeyCode::PageDown | KeyCode::Tab) => Some(KeyAction::NextPage),
        (_, KeyCode::Left | KeyCode::PageUp | KeyCode::BackTab) => Some(KeyAction::PreviousPage),
        _ => None,
    }
}

/// Everything but the bottom status line.
fn dashboard_area(size: Size) -> Rect {
    Rect::new(0, 0, size.width, size.height.saturating_sub(1))
}

fn status_area(size: Size) -> Rect {
    Rect::new(0, size.height.saturating_sub(1), size.width, size.height.min(1))
}

fn screen_of(area: Rect) -> ScreenSize {
    ScreenSize::new(u32::from(area.width), u32::from(area.height))
}

/// Terminal cell to layout point, if it lies on the dashboard.
fn tap_point(area: Rect, column: u16, row: u16) -> Option<Point> {
    area.contains(ratatui::layout::Position::new(column, row))
        .then(|| Point::new(u32::from(column - area.x), u32::from(row - area.y)))
}

/// What to tell the user when the configuration cannot be used.
fn config_problem(error: &CoreError, path: &Path) -> ConfigProblem {
    match error {
        CoreError::Config(ConfigError::NotFound { .. }) => ConfigProblem {
            title: "No configuration found",
            detail: format!("Create {}", path.display()),
            hint: "haslate init-config writes a starter file; save it or press r to retry, q quits",
        },
        other => ConfigProblem {
            title: "Configuration error",
            detail: other.to_string(),
            hint: "fix the file and save it, or press r to retry; q quits",
        },
    }
}

async fn config_changed(watcher: &mut Option<ConfigWatcher>) {
    match watcher {
        Some(w) => {
            if w.changed().await.is_none() {
                *watcher = None;
            }
        }
        None => std::future::pending().await,
    }
}

/// Wait out the rest of an editor's save, then drop the extra signals.
async fn settle(watcher: &mut Option<ConfigWatcher>) {
    tokio::time::sleep(SETTLE).await;
    if let Some(w) = watcher.as_mut() {
        while w.try_changed().is_some() {}
    }
}

/// Last drawn content of every tile on the page, in z-order.
#[derive(Default)]
struct View {
    tiles: BTreeMap<usize, DrawCommand>,
    connection: Option<ConnectionState>,
    status: DashboardStatus,
    dirty: bool,
}

impl View {
    fn replace(&mut self, frame: Vec<DrawCommand>) {
        self.tiles = frame.into_iter().map(|c| (c.index, c)).collect();
        self.dirty = true;
    }

    fn merge(&mut self, frame: Vec<DrawCommand>) {
        if frame.is_empty() {
            return;
        }
        self.tiles.extend(frame.into_iter().map(|c| (c.index, c)));
        self.dirty = true;
    }

    fn observe(&mut self, controller: &Controller) {
        let connection = controller.connection_state();
        if self.connection != Some(connection) {
            self.connection = Some(connection);
            self.dirty = true;
        }
        let status = controller.status();
        if self.status != status {
            self.status = status;
            self.dirty = true;
        }
    }

    fn render(&self, frame: &mut Frame, page: Option<&str>) {
        let size = frame.area().as_size();
        let area = dashboard_area(size);
        for tile in self.tiles.values() {
            render::render_tile(frame, area, tile);
        }
        render::render_status(
            frame,
            status_area(size),
            &StatusLine {
                connection: self.connection.unwrap_or(ConnectionState::Disconnected),
                status: &self.status,
                page,
            },
        );
    }
}

pub struct App {
    config_path: PathBuf,
}

impl App {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub async fn run(self) -> Result<()> {
        let sensors: Arc<dyn LocalSensors> = Arc::new(SysfsSensors::new());
        let mut watcher = match ConfigWatcher::new(&self.config_path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "not watching the config file; use r to reload");
                None
            }
        };

        let mut tui = Tui::enter()?;
        let mut events = EventReader::new(TICK);

        let Some(mut controller) = self
            .start_controller(&sensors, &mut tui, &mut events, &mut watcher)
            .await?
        else {
            info!("quit before a configuration was loaded");
            return Ok(());
        };

        let result = Self::event_loop(&mut controller, &mut tui, &mut events, &mut watcher).await;
        drop(events);
        drop(tui);
        controller.shutdown().await;
        result
    }

    /// Start the controller, showing what is wrong with the configuration
    /// and retrying after each edit or `r` until it loads. `None` if the
    /// user quits first.
    async fn start_controller(
        &self,
        sensors: &Arc<dyn LocalSensors>,
        tui: &mut Tui,
        events: &mut EventReader,
        watcher: &mut Option<ConfigWatcher>,
    ) -> Result<Option<Controller>> {
        loop {
            let screen = screen_of(dashboard_area(tui.size()?));
            let options = ControllerOptions::new(self.config_path.clone(), screen);
            let error = match Controller::start(options, Arc::clone(sensors)) {
                Ok(controller) => return Ok(Some(controller)),
                Err(e) if e.is_config_error() => e,
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!("could not start with {}", self.config_path.display())
                    });
                }
            };

            warn!(error = %error, "configuration not usable, waiting for a fix");
            let problem = config_problem(&error, &self.config_path);
            tui.draw(|frame| render::render_config_problem(frame, &problem))?;

            loop {
                tokio::select! {
                    event = events.next() => match event {
                        None => return Ok(None),
                        Some(Event::Key(key)) => match key_action(key) {
                            Some(KeyAction::Quit) => return Ok(None),
                            Some(KeyAction::Reload) => break,
                            _ => {}
                        },
                        Some(Event::Resize) => break,
                        Some(Event::Tap { .. } | Event::Tick) => {}
                    },
                    () = config_changed(watcher) => {
                        settle(watcher).await;
                        info!("config file changed");
                        break;
                    }
                }
            }
        }
    }

    async fn event_loop(
        controller: &mut Controller,
        tui: &mut Tui,
        events: &mut EventReader,
        watcher: &mut Option<ConfigWatcher>,
    ) -> Result<()> {
        let mut view = View::default();
        view.replace(controller.full_frame());

        info!("dashboard loop started");
        loop {
            let full = tokio::select! {
                event = events.next() => {
                    let Some(event) = event else { break };
                    match Self::handle(event, controller, tui).await? {
                        ControlFlow::Break(()) => break,
                        ControlFlow::Continue(full) => full,
                    }
                }
                () = config_changed(watcher) => {
                    settle(watcher).await;
                    info!("config file changed");
                    reload(controller).await;
                    true
                }
            };

            if full {
                view.replace(controller.full_frame());
            } else {
                view.merge(controller.frame());
            }
            view.observe(controller);

            if view.dirty {
                let page = controller.page_name();
                tui.draw(|frame| view.render(frame, page))?;
                view.dirty = false;
            }
        }
        info!("dashboard loop ended");
        Ok(())
    }

    /// React to one input event. `Continue(true)` asks for a full redraw.
    async fn handle(
        event: Event,
        controller: &mut Controller,
        tui: &Tui,
    ) -> Result<ControlFlow<(), bool>> {
        let full = match event {
            Event::Tick => false,
            Event::Key(key) => match key_action(key) {
                None => false,
                Some(KeyAction::Quit) => return Ok(ControlFlow::Break(())),
                Some(KeyAction::Reload) => {
                    reload(controller).await;
                    true
                }
                Some(KeyAction::NextPage) => {
                    controller.next_page();
                    true
                }
                Some(KeyAction::PreviousPage) => {
                    controller.previous_page();
                    true
                }
            },
            Event::Tap { column, row } => {
                let area = dashboard_area(tui.size()?);
                match tap_point(area, column, row) {
                    Some(point) => {
                        if controller.activate(point).is_break() {
                            return Ok(ControlFlow::Break(()));
                        }
                        true
                    }
                    None => false,
                }
            }
            Event::Resize => {
                let screen = screen_of(dashboard_area(tui.size()?));
                if let Err(e) = controller.resize(screen) {
                    warn!(error = %e, width = screen.width, height = screen.height, "keeping previous layout");
                }
                true
            }
        };
        Ok(ControlFlow::Continue(full))
    }
}

async fn reload(controller: &mut Controller) {
    match controller.reload().await {
        Ok(outcome) => {
            if outcome.system_changed {
                info!("system settings changed; they take effect after a device restart");
            }
        }
        Err(e) => warn!(error = %e, "reload rejected"),
    }
}

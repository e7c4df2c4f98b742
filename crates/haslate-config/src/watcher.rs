//! Config file watcher.
//!
//! Produces the "config changed" signal while the file is being edited in
//! place. The parent directory is watched rather than the file itself so
//! editors that save by rename are still seen.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ConfigError;

/// Signal emitted when the watched config file may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSignal {
    Changed(PathBuf),
}

pub struct ConfigWatcher {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<ConfigSignal>,
    /// Kept alive for as long as signals are wanted.
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let dir = dir.canonicalize()?;
        let file_name = path.file_name().map(ToOwned::to_owned).ok_or_else(|| {
            ConfigError::Validation {
                field: "config path".into(),
                reason: format!("{} has no file name", path.display()),
            }
        })?;
        let path = dir.join(&file_name);

        let (tx, rx) = mpsc::unbounded_channel();
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Some(signal) = event_to_signal(&target, &event) {
                        let _ = tx.send(signal);
                    }
                }
                Err(e) => warn!(error = %e, "config watcher error"),
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "watching configuration file");

        Ok(Self {
            path,
            rx,
            _watcher: watcher,
        })
    }

    /// Absolute path of the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next change. Returns `None` once the watcher is gone.
    pub async fn changed(&mut self) -> Option<ConfigSignal> {
        let signal = self.rx.recv().await?;
        self.drain();
        Some(signal)
    }

    /// Non-blocking poll; a burst of filesystem events collapses to one signal.
    pub fn try_changed(&mut self) -> Option<ConfigSignal> {
        let signal = self.rx.try_recv().ok()?;
        self.drain();
        Some(signal)
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

fn event_to_signal(target: &Path, event: &Event) -> Option<ConfigSignal> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {}
        _ => return None,
    }
    if !event.paths.iter().any(|p| p == target) {
        return None;
    }
    debug!(kind = ?event.kind, "config file event");
    Some(ConfigSignal::Changed(target.to_path_buf()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_target_writes_signal() {
        let target = Path::new("/cfg/haslate.yaml");

        assert_eq!(
            event_to_signal(target, &event(EventKind::Modify(ModifyKind::Any), "/cfg/haslate.yaml")),
            Some(ConfigSignal::Changed(target.to_path_buf()))
        );
        assert_eq!(
            event_to_signal(target, &event(EventKind::Create(CreateKind::File), "/cfg/haslate.yaml")),
            Some(ConfigSignal::Changed(target.to_path_buf()))
        );
        assert_eq!(
            event_to_signal(target, &event(EventKind::Modify(ModifyKind::Any), "/cfg/other.yaml")),
            None
        );
        assert_eq!(
            event_to_signal(target, &event(EventKind::Remove(RemoveKind::File), "/cfg/haslate.yaml")),
            None
        );
    }

    #[tokio::test]
    async fn new_resolves_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("haslate.yaml");
        std::fs::write(&file, "application: {}\n").unwrap();

        let watcher = ConfigWatcher::new(&file).unwrap();
        assert!(watcher.path().is_absolute());
        assert!(watcher.path().ends_with("haslate.yaml"));
    }
}

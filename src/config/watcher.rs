//! Configuration file watcher for backend topology reload.
//!
//! The parent directory is watched rather than the file itself: editors and
//! deploy tools usually replace the file with a rename, which a watch on the
//! old inode never sees.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reloads the configuration file whenever it changes and publishes every
/// document that passes validation.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);

        let path = self.path.clone();
        let tx = self.update_tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_deref()) => reload(&path, &tx),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` rewrote the watched file.
fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return false;
    }
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<GatewayConfig>) {
    tracing::info!(path = %path.display(), "Config file changed, reloading");
    match load_config(path) {
        Ok(config) => {
            if tx.send(config).is_err() {
                tracing::debug!("Config receiver dropped, ignoring update");
            }
        }
        Err(e) => tracing::error!(
            error = %e,
            "Rejected config reload, keeping current configuration"
        ),
    }
}

//! Routes file watcher for hot reload.
//!
//! The watcher only signals; rebuilding the table happens on the runtime
//! (see [`crate::routing::reload`]) so the notify thread never parses.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A watcher that monitors the routes definition for changes.
pub struct RoutesWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl RoutesWatcher {
    /// Create a new RoutesWatcher.
    ///
    /// Returns the watcher and a receiver that yields one message per change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// Watches the parent directory so that replace-by-rename is observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_routes = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_routes {
                        tracing::debug!(kind = ?event.kind, "Routes file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Routes watcher started");
        Ok(watcher)
    }
}

//! Hot-reloadable route table handle.
//!
//! Readers take a snapshot (`Arc<RouteTable>`) and resolve against it; a
//! reload builds a complete new table off to the side and swaps the pointer.
//! A failed build leaves the current table in place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::definition::{RoutesDefinition, RoutesError};
use crate::routing::router::RouteTable;

/// Shared handle to the current route table.
#[derive(Clone)]
pub struct RouteTableHandle {
    inner: Arc<Inner>,
}

struct Inner {
    current: ArcSwap<RouteTable>,
    generation: AtomicU64,
    source: Option<PathBuf>,
    default_host: Option<String>,
}

impl RouteTableHandle {
    /// Wrap an already-built table. `reload()` is unavailable without a source file.
    pub fn new(table: RouteTable, default_host: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(table),
                generation: AtomicU64::new(1),
                source: None,
                default_host,
            }),
        }
    }

    /// Initial load from a file. Errors here are fatal to startup.
    pub async fn load(path: &Path, default_host: Option<String>) -> Result<Self, RoutesError> {
        let table = read_table(path, default_host.as_deref()).await?;
        tracing::info!(path = ?path, rules = table.len(), generation = 1, "Routes loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(table),
                generation: AtomicU64::new(1),
                source: Some(path.to_path_buf()),
                default_host,
            }),
        })
    }

    /// The current table, complete and immutable.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.inner.current.load_full()
    }

    /// Incremented on every successful swap.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn source(&self) -> Option<&Path> {
        self.inner.source.as_deref()
    }

    /// Rebuild from JSON text and swap on success.
    pub fn reload_from_str(&self, text: &str) -> Result<u64, RoutesError> {
        let result = RoutesDefinition::from_json(text)
            .and_then(|def| RouteTable::build(&def, self.inner.default_host.as_deref()));
        self.install(result)
    }

    /// Re-read the source file and swap on success.
    pub async fn reload(&self) -> Result<u64, RoutesError> {
        let Some(path) = self.inner.source.as_deref() else {
            return Err(RoutesError::Malformed("no routes file configured".into()));
        };
        let result = read_table(path, self.inner.default_host.as_deref()).await;
        self.install(result)
    }

    fn install(&self, result: Result<RouteTable, RoutesError>) -> Result<u64, RoutesError> {
        match result {
            Ok(table) => {
                let rules = table.len();
                self.inner.current.store(Arc::new(table));
                let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
                metrics::record_route_reload("success");
                tracing::info!(generation, rules, "Route table swapped");
                Ok(generation)
            }
            Err(e) => {
                metrics::record_route_reload("failure");
                tracing::warn!(error = %e, generation = self.generation(), "Routes reload failed, keeping current table");
                Err(e)
            }
        }
    }

    /// Reload on every change notification until shutdown.
    pub async fn run_reload_loop(self, mut changes: mpsc::UnboundedReceiver<()>, shutdown: Shutdown) {
        let mut shutdown_rx = shutdown.subscribe();
        loop {
            tokio::select! {
                change = changes.recv() => {
                    if change.is_none() {
                        break;
                    }
                    // Editors often emit several events per save.
                    while changes.try_recv().is_ok() {}
                    let _ = self.reload().await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        tracing::debug!("Routes reload loop stopped");
    }
}

async fn read_table(path: &Path, default_host: Option<&str>) -> Result<RouteTable, RoutesError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| RoutesError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let definition = RoutesDefinition::from_json(&text)?;
    RouteTable::build(&definition, default_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_reload_keeps_previous_table() {
        let handle = RouteTableHandle::new(RouteTable::default(), None);
        handle.reload_from_str(r#"{"a.example.com": "10.0.0.1:8080"}"#).unwrap();
        let before = handle.generation();

        assert!(handle.reload_from_str("[1, 2, 3]").is_err());
        assert!(handle.reload_from_str(r#"{"a.example.com": "no-port"}"#).is_err());

        assert_eq!(handle.generation(), before);
        let table = handle.snapshot();
        assert_eq!(table.resolve(Some("a.example.com"), "/").unwrap().port, 8080);
    }

    #[test]
    fn valid_reload_replaces_table_wholesale() {
        let handle = RouteTableHandle::new(RouteTable::default(), None);
        handle
            .reload_from_str(r#"{"a.example.com": "10.0.0.1:1", "b.example.com": "10.0.0.2:2"}"#)
            .unwrap();
        let old = handle.snapshot();

        handle.reload_from_str(r#"{"c.example.com": "10.0.0.3:3"}"#).unwrap();
        let new = handle.snapshot();

        // The old snapshot is still whole for whoever holds it.
        assert_eq!(old.resolve(Some("b.example.com"), "/").unwrap().port, 2);
        assert!(new.resolve(Some("a.example.com"), "/").is_err());
        assert_eq!(new.resolve(Some("c.example.com"), "/").unwrap().port, 3);
    }

    #[tokio::test]
    async fn reloads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, r#"{"a.example.com": "10.0.0.1:1"}"#).unwrap();

        let handle = RouteTableHandle::load(&path, Some("a.example.com".into())).await.unwrap();
        assert_eq!(handle.snapshot().resolve(None, "/").unwrap().port, 1);

        std::fs::write(&path, r#"{"a.example.com": "10.0.0.1:2"}"#).unwrap();
        assert_eq!(handle.reload().await.unwrap(), 2);
        assert_eq!(handle.snapshot().resolve(None, "/").unwrap().port, 2);

        std::fs::write(&path, "{ truncated").unwrap();
        assert!(handle.reload().await.is_err());
        assert_eq!(handle.snapshot().resolve(None, "/").unwrap().port, 2);
    }

    #[tokio::test]
    async fn initial_load_fails_on_missing_file() {
        let err = RouteTableHandle::load(Path::new("/nonexistent/routes.json"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RoutesError::Read { .. }));
    }

    #[tokio::test]
    async fn reload_loop_applies_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, r#"{"a.example.com": "10.0.0.1:1"}"#).unwrap();

        let handle = RouteTableHandle::load(&path, None).await.unwrap();
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(handle.clone().run_reload_loop(rx, shutdown.clone()));

        std::fs::write(&path, r#"{"a.example.com": "10.0.0.1:7"}"#).unwrap();
        tx.send(()).unwrap();

        for _ in 0..50 {
            if handle.generation() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(handle.snapshot().resolve(Some("a.example.com"), "/").unwrap().port, 7);

        shutdown.trigger();
        task.await.unwrap();
    }
}

// Source and breakpoint registries
//
// Owns the identity mapping of loaded scripts and the session's
// breakpoint collections. Scripts arrive addressed by inspector script
// id; clients address them by filesystem path or by adapter-assigned
// numeric reference. The same logical source is stored under every key it
// has so any of them resolves in O(1).

use crate::protocol;
use crate::sourcemap::PositionTranslator;
use inspector_client::types::{BreakpointId, ScriptId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// One loaded script. Cheap to clone; clones share identity.
#[derive(Debug, Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

#[derive(Debug)]
struct SourceInner {
    script_id: ScriptId,
    /// Exactly one of `path` / `source_reference` is set.
    path: Option<String>,
    source_reference: Option<i64>,
    name: String,
    translator: PositionTranslator,
}

impl Source {
    fn on_disk(script_id: ScriptId, path: String, translator: PositionTranslator) -> Self {
        let name = path
            .rsplit('/')
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        Self {
            inner: Arc::new(SourceInner {
                script_id,
                path: Some(path),
                source_reference: None,
                name,
                translator,
            }),
        }
    }

    fn virtual_script(
        script_id: ScriptId,
        source_reference: i64,
        name: String,
        translator: PositionTranslator,
    ) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                script_id,
                path: None,
                source_reference: Some(source_reference),
                name,
                translator,
            }),
        }
    }

    pub fn script_id(&self) -> &ScriptId {
        &self.inner.script_id
    }

    pub fn path(&self) -> Option<&str> {
        self.inner.path.as_deref()
    }

    pub fn source_reference(&self) -> Option<i64> {
        self.inner.source_reference
    }

    pub fn translator(&self) -> &PositionTranslator {
        &self.inner.translator
    }

    /// Key under which this source's breakpoints are grouped.
    pub fn key(&self) -> SourceKey {
        match (&self.inner.path, self.inner.source_reference) {
            (Some(path), _) => SourceKey::Path(path.clone()),
            (None, Some(reference)) => SourceKey::Reference(reference),
            // Constructors make this unreachable.
            (None, None) => SourceKey::Reference(0),
        }
    }

    pub fn to_dap(&self) -> protocol::Source {
        protocol::Source {
            name: Some(self.inner.name.clone()),
            path: self.inner.path.clone(),
            source_reference: self.inner.source_reference,
        }
    }
}

/// Client-side identity of a source for breakpoint grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Path(String),
    Reference(i64),
}

impl SourceKey {
    pub fn from_dap(source: &protocol::Source) -> Option<SourceKey> {
        if let Some(path) = &source.path {
            return Some(SourceKey::Path(normalize_path(path)));
        }
        source.source_reference.map(SourceKey::Reference)
    }
}

/// Strip a `file://` scheme and backslashes so inspector URLs and client
/// paths compare equal.
pub fn normalize_path(path: &str) -> String {
    let path = path.strip_prefix("file://").unwrap_or(path);
    path.replace('\\', "/")
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    by_script_id: HashMap<ScriptId, Source>,
    by_path: HashMap<String, Source>,
    by_reference: HashMap<i64, Source>,
    next_reference: i64,
    waiters: HashMap<String, Vec<oneshot::Sender<Source>>>,
}

/// Result of registering a parsed script.
pub struct Registered {
    pub source: Source,
    /// Previous entry for the same path, displaced by a reload.
    pub superseded: Option<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            next_reference: 1,
            ..Default::default()
        }
    }

    /// Register a script reported by the inspector.
    ///
    /// URLs that name a file become path-addressed sources; everything
    /// else (ad-hoc evaluations, internal scripts) gets the next numeric
    /// reference. A reload of an already-known path supersedes the old
    /// entry.
    pub fn register(
        &mut self,
        script_id: ScriptId,
        url: &str,
        translator: PositionTranslator,
    ) -> Registered {
        let path = script_url_path(url);

        let (source, superseded) = match path {
            Some(path) => {
                let source = Source::on_disk(script_id.clone(), path.clone(), translator);
                let superseded = self.by_path.insert(path.clone(), source.clone());
                if let Some(old) = &superseded {
                    debug!("Source {} superseded by script {}", path, script_id);
                    self.by_script_id.remove(old.script_id());
                }

                for waiter in self.waiters.remove(&path).unwrap_or_default() {
                    waiter.send(source.clone()).ok();
                }

                (source, superseded)
            }
            None => {
                let reference = self.next_reference;
                self.next_reference += 1;

                let name = if url.is_empty() {
                    format!("eval-{}", reference)
                } else {
                    url.to_string()
                };
                let source =
                    Source::virtual_script(script_id.clone(), reference, name, translator);
                self.by_reference.insert(reference, source.clone());
                (source, None)
            }
        };

        self.by_script_id.insert(script_id, source.clone());
        Registered { source, superseded }
    }

    pub fn by_script_id(&self, script_id: &str) -> Option<Source> {
        self.by_script_id.get(script_id).cloned()
    }

    pub fn by_path(&self, path: &str) -> Option<Source> {
        self.by_path.get(&normalize_path(path)).cloned()
    }

    pub fn by_reference(&self, reference: i64) -> Option<Source> {
        self.by_reference.get(&reference).cloned()
    }

    pub fn by_key(&self, key: &SourceKey) -> Option<Source> {
        match key {
            SourceKey::Path(path) => self.by_path(path),
            SourceKey::Reference(reference) => self.by_reference(*reference),
        }
    }

    /// Resolve a source now, or hand back a receiver that fires when the
    /// script for `path` eventually loads. Callers must not hold session
    /// locks while awaiting the receiver.
    pub fn resolve_or_wait(&mut self, path: &str) -> Result<Source, oneshot::Receiver<Source>> {
        let normalized = normalize_path(path);
        if let Some(source) = self.by_path.get(&normalized) {
            return Ok(source.clone());
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(normalized).or_default().push(tx);
        Err(rx)
    }

    pub fn all(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .by_path
            .values()
            .chain(self.by_reference.values())
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.inner.name.cmp(&b.inner.name));
        sources
    }

    /// Drop all sources and pending waiters (their receivers observe the
    /// closed channel).
    pub fn clear(&mut self) {
        self.by_script_id.clear();
        self.by_path.clear();
        self.by_reference.clear();
        self.waiters.clear();
        self.next_reference = 1;
    }
}

/// Extract a filesystem path from a script URL, if it names one.
fn script_url_path(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    let normalized = normalize_path(url);
    if normalized.starts_with('/') {
        Some(normalized)
    } else {
        None
    }
}

// ============================================================
// Breakpoints
// ============================================================

/// A location breakpoint with its session-stable id.
#[derive(Debug, Clone)]
pub struct LocationBreakpoint {
    pub id: i64,
    /// Binding handle in the inspector; absent when binding failed.
    pub inspector_id: Option<BreakpointId>,
    /// Position the client asked for, authored 1-based coordinates; the
    /// identity used to reuse an existing binding on a repeated set.
    pub requested_line: i64,
    pub requested_column: Option<i64>,
    /// Position reported back: the actual bound location when the
    /// inspector resolved one, the requested position otherwise.
    pub line: i64,
    pub column: Option<i64>,
    pub verified: bool,
    pub message: Option<String>,
}

impl LocationBreakpoint {
    pub fn to_dap(&self, source: Option<protocol::Source>) -> protocol::Breakpoint {
        protocol::Breakpoint {
            id: self.id,
            verified: self.verified,
            message: self.message.clone(),
            source,
            line: Some(self.line),
            column: self.column,
        }
    }
}

/// A breakpoint on a symbol name.
#[derive(Debug, Clone)]
pub struct FunctionBreakpoint {
    pub id: i64,
    pub name: String,
    pub verified: bool,
    pub message: Option<String>,
}

impl FunctionBreakpoint {
    pub fn to_dap(&self) -> protocol::Breakpoint {
        protocol::Breakpoint {
            id: self.id,
            verified: self.verified,
            message: self.message.clone(),
            source: None,
            line: None,
            column: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    next_id: i64,
    by_source: HashMap<SourceKey, Vec<LocationBreakpoint>>,
    functions: Vec<FunctionBreakpoint>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Allocate the next session-scoped breakpoint id.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Replace the breakpoint set for one source, returning the previous
    /// set (the caller diffs and unbinds what was dropped).
    pub fn replace_for_source(
        &mut self,
        key: SourceKey,
        breakpoints: Vec<LocationBreakpoint>,
    ) -> Vec<LocationBreakpoint> {
        self.by_source.insert(key, breakpoints).unwrap_or_default()
    }

    pub fn for_source(&self, key: &SourceKey) -> &[LocationBreakpoint] {
        self.by_source.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the function breakpoint set, returning the previous one.
    pub fn replace_functions(
        &mut self,
        breakpoints: Vec<FunctionBreakpoint>,
    ) -> Vec<FunctionBreakpoint> {
        std::mem::replace(&mut self.functions, breakpoints)
    }

    pub fn functions(&self) -> &[FunctionBreakpoint] {
        &self.functions
    }

    /// Session id of the location breakpoint bound under an inspector
    /// handle, for stop-event attribution.
    pub fn find_by_inspector_id(&self, inspector_id: &str) -> Option<i64> {
        self.by_source
            .values()
            .flatten()
            .find(|bp| bp.inspector_id.as_deref() == Some(inspector_id))
            .map(|bp| bp.id)
    }

    pub fn find_function_by_name(&self, name: &str) -> Option<i64> {
        self.functions
            .iter()
            .find(|bp| bp.name == name)
            .map(|bp| bp.id)
    }

    pub fn clear(&mut self) {
        self.by_source.clear();
        self.functions.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_script(url: &str) -> (SourceRegistry, Source) {
        let mut registry = SourceRegistry::new();
        let registered = registry.register("1".to_string(), url, PositionTranslator::identity());
        (registry, registered.source)
    }

    #[test]
    fn test_lookup_by_any_key() {
        let (registry, source) = registry_with_script("file:///app/main.js");

        assert_eq!(source.path(), Some("/app/main.js"));
        assert_eq!(source.source_reference(), None);

        let by_id = registry.by_script_id("1").unwrap();
        let by_path = registry.by_path("/app/main.js").unwrap();
        assert_eq!(by_id.script_id(), source.script_id());
        assert_eq!(by_path.path(), source.path());
        assert!(Arc::ptr_eq(&by_id.inner, &by_path.inner));
    }

    #[test]
    fn test_virtual_scripts_get_monotonic_references() {
        let mut registry = SourceRegistry::new();

        let first = registry
            .register("1".to_string(), "", PositionTranslator::identity())
            .source;
        let second = registry
            .register("2".to_string(), "", PositionTranslator::identity())
            .source;

        assert_eq!(first.source_reference(), Some(1));
        assert_eq!(second.source_reference(), Some(2));
        assert!(first.path().is_none());
        assert!(registry.by_reference(1).is_some());
    }

    #[test]
    fn test_reload_supersedes_path_entry() {
        let (mut registry, _) = registry_with_script("file:///app/main.js");

        let reloaded = registry.register(
            "7".to_string(),
            "file:///app/main.js",
            PositionTranslator::identity(),
        );

        let superseded = reloaded.superseded.expect("old entry displaced");
        assert_eq!(superseded.script_id(), "1");
        // The old script id no longer resolves; the path now points at
        // the new script.
        assert!(registry.by_script_id("1").is_none());
        assert_eq!(registry.by_path("/app/main.js").unwrap().script_id(), "7");
    }

    #[tokio::test]
    async fn test_pending_source_resolution() {
        let mut registry = SourceRegistry::new();

        let waiter = match registry.resolve_or_wait("/app/later.js") {
            Err(rx) => rx,
            Ok(_) => panic!("source should not exist yet"),
        };

        registry.register(
            "3".to_string(),
            "file:///app/later.js",
            PositionTranslator::identity(),
        );

        let source = waiter.await.expect("waiter resolved");
        assert_eq!(source.path(), Some("/app/later.js"));

        // Now resolvable synchronously.
        assert!(registry.resolve_or_wait("/app/later.js").is_ok());
    }

    #[test]
    fn test_clear_drops_waiters() {
        let mut registry = SourceRegistry::new();
        let waiter = registry.resolve_or_wait("/gone.js").unwrap_err();

        registry.clear();

        assert!(waiter.blocking_recv().is_err());
    }

    #[test]
    fn test_breakpoint_ids_are_monotonic_and_reset() {
        let mut breakpoints = BreakpointRegistry::new();
        assert_eq!(breakpoints.next_id(), 1);
        assert_eq!(breakpoints.next_id(), 2);

        breakpoints.clear();
        assert_eq!(breakpoints.next_id(), 1);
    }

    #[test]
    fn test_find_by_inspector_id() {
        let mut breakpoints = BreakpointRegistry::new();
        let key = SourceKey::Path("/a.js".to_string());

        let id = breakpoints.next_id();
        breakpoints.replace_for_source(
            key.clone(),
            vec![LocationBreakpoint {
                id,
                inspector_id: Some("bp:42".to_string()),
                requested_line: 3,
                requested_column: None,
                line: 3,
                column: None,
                verified: true,
                message: None,
            }],
        );

        assert_eq!(breakpoints.find_by_inspector_id("bp:42"), Some(id));
        assert_eq!(breakpoints.find_by_inspector_id("bp:7"), None);
    }
}

//! Hook registry
//!
//! Hooks are Rust closures registered by name in a `HandlerTable`. A tree
//! level's flow file records which handler name is bound to which event,
//! grouped by kind:
//!
//! ```text
//! XX.flow {
//!     proxy: { get: "audit", set: "clamp" },   // interceptors
//!     call:  { total: "sum_children" },        // injected methods
//! }
//! ```
//!
//! Only names are persisted. A name that is not registered in the running
//! process resolves to nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::file::{DebouncedFile, FileTable};
use crate::nav::Facade;
use crate::value::{Map, Value};

/// Group holding get/set/delete interceptors
pub const PROXY_GROUP: &str = "proxy";

/// Group holding injected methods
pub const CALL_GROUP: &str = "call";

/// A registered hook or method body
pub type Handler = Arc<dyn Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Handler table
// =============================================================================

/// Named handlers available to every tree level
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a handler
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("names", &self.names())
            .finish()
    }
}

// =============================================================================
// Hook context
// =============================================================================

/// How a handler settled the operation it intercepted
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Finish with this value instead of running the operation
    Resolved(Value),
    /// Fail the operation with `TreeError::Rejected`
    Rejected(String),
    /// Finish without a value and without running the operation
    Halted,
}

/// What a handler sees while it runs
pub struct HookContext<'a> {
    facade: &'a Facade,
    key: &'a str,
    args: &'a [Value],
    outcome: Option<Outcome>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(facade: &'a Facade, key: &'a str, args: &'a [Value]) -> Self {
        Self {
            facade,
            key,
            args,
            outcome: None,
        }
    }

    /// Settle with a value; only the first settlement counts
    pub fn resolve(&mut self, value: impl Into<Value>) {
        self.settle(Outcome::Resolved(value.into()));
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.settle(Outcome::Rejected(reason.into()));
    }

    pub fn halt(&mut self) {
        self.settle(Outcome::Halted);
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Key (or method name) being accessed
    pub fn key(&self) -> &str {
        self.key
    }

    /// Call arguments; the incoming value for `set`
    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, position: usize) -> Option<&Value> {
        self.args.get(position)
    }

    /// The tree level the hook is attached to
    pub fn data(&self) -> &Facade {
        self.facade
    }

    pub fn index(&self) -> Result<Map> {
        self.facade.level().index().snapshot()
    }

    pub fn flow(&self) -> &HookRegistry {
        self.facade.level().flow()
    }

    /// Navigate from the hooked level
    pub fn open(&self, path: &[&str]) -> Result<Option<Facade>> {
        self.facade.open(path)
    }

    pub(crate) fn into_outcome(self) -> Option<Outcome> {
        self.outcome
    }

    fn settle(&mut self, outcome: Outcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }
}

/// Run `handler` and return how it settled
pub(crate) fn run_handler(
    handler: &Handler,
    facade: &Facade,
    key: &str,
    args: &[Value],
) -> Result<Option<Outcome>> {
    let mut ctx = HookContext::new(facade, key, args);
    handler(&mut ctx)?;
    Ok(ctx.into_outcome())
}

// =============================================================================
// Hook registry
// =============================================================================

/// Per-level binding of events to handler names.
///
/// The flow file is created only when the first binding is stored.
pub struct HookRegistry {
    files: Arc<FileTable>,
    name: String,
    handlers: Arc<HandlerTable>,
    file: Mutex<Option<DebouncedFile>>,
}

impl HookRegistry {
    pub fn new(files: Arc<FileTable>, flow_file: String, handlers: Arc<HandlerTable>) -> Self {
        Self {
            files,
            name: flow_file,
            handlers,
            file: Mutex::new(None),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    /// Whether this level has a flow file
    pub fn is_flow(&self) -> bool {
        self.file.lock().is_some() || self.files.store().exists_sync(&self.name)
    }

    /// Event → handler name bindings of a group
    pub fn get(&self, group: &str) -> Result<Option<Map>> {
        let Some(file) = self.existing()? else {
            return Ok(None);
        };
        let data = file.data()?;
        let bindings = data.read().get(group).and_then(Value::as_map).cloned();
        Ok(bindings)
    }

    /// Handler bound to `event` in `group`, resolved against the table
    pub fn handler(&self, group: &str, event: &str) -> Result<Option<Handler>> {
        let Some(file) = self.existing()? else {
            return Ok(None);
        };
        let data = file.data()?;
        let bound = data
            .read()
            .get(group)
            .and_then(Value::as_map)
            .and_then(|bindings| bindings.get(event))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(name) = bound else {
            return Ok(None);
        };
        let handler = self.handlers.get(&name);
        if handler.is_none() {
            tracing::warn!(flow = %self.name, group, event, handler = %name, "unregistered handler");
        }
        Ok(handler)
    }

    /// Bind events to handler names, merging into the existing group.
    ///
    /// Names missing from the handler table are skipped. Returns the number
    /// of bindings stored.
    pub fn set<I, E, H>(&self, group: &str, bindings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (E, H)>,
        E: Into<String>,
        H: Into<String>,
    {
        let accepted: Vec<(String, String)> = bindings
            .into_iter()
            .map(|(event, handler)| (event.into(), handler.into()))
            .filter(|(event, handler)| {
                let known = self.handlers.contains(handler);
                if !known {
                    tracing::warn!(flow = %self.name, group, event = %event, handler = %handler, "skipping unregistered handler");
                }
                known
            })
            .collect();
        if accepted.is_empty() {
            return Ok(0);
        }

        let file = self.create()?;
        let data = file.data()?;
        {
            let mut map = data.write();
            let mut merged = map
                .get(group)
                .and_then(Value::as_map)
                .cloned()
                .unwrap_or_default();
            for (event, handler) in &accepted {
                merged.insert(event.as_str(), handler.as_str());
            }
            map.insert(group, merged);
        }
        file.save(false)?;
        Ok(accepted.len())
    }

    /// Remove one binding, or the whole group when `event` is `None`.
    ///
    /// Groups left empty are dropped.
    pub fn delete(&self, group: &str, event: Option<&str>) -> Result<bool> {
        let Some(file) = self.existing()? else {
            return Ok(false);
        };
        let data = file.data()?;
        let removed = {
            let mut map = data.write();
            match event {
                None => map.remove(group).is_some(),
                Some(event) => {
                    let removed = match map.get_mut(group) {
                        Some(Value::Map(bindings)) => bindings.remove(event).is_some(),
                        _ => false,
                    };
                    let empty = matches!(map.get(group), Some(Value::Map(b)) if b.is_empty());
                    if empty {
                        map.remove(group);
                    }
                    removed
                }
            }
        };
        if removed {
            file.save(false)?;
        }
        Ok(removed)
    }

    fn existing(&self) -> Result<Option<DebouncedFile>> {
        let mut slot = self.file.lock();
        if let Some(file) = slot.as_ref() {
            return Ok(Some(file.clone()));
        }
        if !self.files.store().exists_sync(&self.name) {
            return Ok(None);
        }
        let file = self.files.open(&self.name)?;
        *slot = Some(file.clone());
        Ok(Some(file))
    }

    fn create(&self) -> Result<DebouncedFile> {
        let mut slot = self.file.lock();
        if let Some(file) = slot.as_ref() {
            return Ok(file.clone());
        }
        tracing::debug!(flow = %self.name, "creating hook registry");
        let file = self.files.open(&self.name)?;
        *slot = Some(file.clone());
        Ok(file)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("file", &self.name)
            .finish()
    }
}

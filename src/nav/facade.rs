//! Tree level façades

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Result, TreeError};
use crate::tree::{
    run_handler, Handler, HookRegistry, Outcome, ShardId, TreeLevel, CALL_GROUP, PROXY_GROUP,
};
use crate::value::{Map, Value, FILE_KEY};

use super::runtime::Runtime;

/// Result of reading one key through a façade
#[derive(Debug, Clone)]
pub enum Entry {
    /// A literal stored at this level
    Value(Value),
    /// A nested level
    Node(Facade),
    /// An injected or shared method
    Method(BoundMethod),
}

impl Entry {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Facade> {
        match self {
            Entry::Node(facade) => Some(facade),
            _ => None,
        }
    }

    pub fn into_method(self) -> Option<BoundMethod> {
        match self {
            Entry::Method(method) => Some(method),
            _ => None,
        }
    }
}

/// A method handler bound to the façade it was looked up on
#[derive(Clone)]
pub struct BoundMethod {
    facade: Facade,
    name: String,
    handler: Handler,
}

impl BoundMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the handler; a handler that never resolves returns `Null`
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match run_handler(&self.handler, &self.facade, &self.name, args)? {
            Some(Outcome::Resolved(value)) => Ok(value),
            Some(Outcome::Rejected(reason)) => Err(TreeError::Rejected(reason)),
            Some(Outcome::Halted) | None => Ok(Value::Null),
        }
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("name", &self.name)
            .field("on", self.facade.id())
            .finish()
    }
}

pub(crate) struct FacadeInner {
    level: TreeLevel,
    runtime: Arc<Runtime>,
}

impl FacadeInner {
    pub(crate) fn mark_purged(&self) {
        self.level.mark_purged();
    }
}

/// Handle on one tree level.
///
/// Every access dispatches through the level's hooks before touching its
/// files. Handles are memoized per shard: two navigations that reach the
/// same level yield equal handles. A handle whose level was deleted from
/// its parent fails every access with `NotFound`.
#[derive(Clone)]
pub struct Facade {
    inner: Arc<FacadeInner>,
}

impl Facade {
    pub(crate) fn new(level: TreeLevel, runtime: Arc<Runtime>) -> Self {
        Self {
            inner: Arc::new(FacadeInner { level, runtime }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<FacadeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<FacadeInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> &ShardId {
        self.inner.level.id()
    }

    pub fn level(&self) -> &TreeLevel {
        &self.inner.level
    }

    pub fn flow(&self) -> &HookRegistry {
        self.inner.level.flow()
    }

    // =========================================================================
    // Property access
    // =========================================================================

    /// Read `key`: injected method, shared method, `get` hook, then stored
    /// value, in that order
    pub fn get(&self, key: &str) -> Result<Option<Entry>> {
        self.inner.level.ensure_live()?;
        if key == FILE_KEY {
            return Ok(None);
        }

        if let Some(method) = self.method(key)? {
            return Ok(Some(Entry::Method(method)));
        }

        if let Some(outcome) = self.intercept("get", key, &[])? {
            return match outcome {
                Outcome::Resolved(value) => Ok(Some(Entry::Value(value))),
                Outcome::Rejected(reason) => Err(TreeError::Rejected(reason)),
                Outcome::Halted => Ok(None),
            };
        }

        match self.inner.level.get(key)? {
            Some(Value::Link(node_file)) => {
                let id = ShardId::from_file(&node_file)
                    .ok_or_else(|| TreeError::InvalidFileName(node_file.clone()))?;
                let child = self.inner.runtime.materialize(id)?;
                Ok(Some(Entry::Node(child)))
            }
            Some(value) => Ok(Some(Entry::Value(value))),
            None => Ok(None),
        }
    }

    /// Materialized value of `key`; nested levels become `Value::Map`
    pub fn value(&self, key: &str) -> Result<Option<Value>> {
        match self.get(key)? {
            Some(Entry::Value(value)) => Ok(Some(value)),
            Some(Entry::Node(child)) => child.to_value().map(Some),
            Some(Entry::Method(_)) | None => Ok(None),
        }
    }

    /// Façade of the nested level under `key`
    pub fn child(&self, key: &str) -> Result<Option<Facade>> {
        Ok(self.get(key)?.and_then(Entry::into_node))
    }

    /// Write `key` through the `set` hook.
    ///
    /// A hook may replace the value (`resolve`), veto the write (`reject`) or
    /// drop it (`halt`). Returns whether a value was stored.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.inner.level.ensure_live()?;
        let value = value.into();
        let value = match self.intercept("set", key, std::slice::from_ref(&value))? {
            None => value,
            Some(Outcome::Resolved(replacement)) => replacement,
            Some(Outcome::Rejected(reason)) => return Err(TreeError::Rejected(reason)),
            Some(Outcome::Halted) => return Ok(false),
        };
        self.inner.level.set(key, value)
    }

    /// Delete `key` through the `delete` hook; returns whether it existed.
    ///
    /// A hook that resolves skips the deletion and reports the truthiness of
    /// its value.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.inner.level.ensure_live()?;
        match self.intercept("delete", key, &[])? {
            None => self.inner.level.delete(key),
            Some(Outcome::Resolved(value)) => Ok(value.is_truthy()),
            Some(Outcome::Rejected(reason)) => Err(TreeError::Rejected(reason)),
            Some(Outcome::Halted) => Ok(false),
        }
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.inner.level.keys()
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.inner.level.has(key)
    }

    /// Façade of the level reached by following `path` through the index
    /// files; `None` if any step is missing
    pub fn open(&self, path: &[&str]) -> Result<Option<Facade>> {
        self.inner.level.ensure_live()?;
        let Some((last, parents)) = path.split_last() else {
            return Ok(Some(self.clone()));
        };

        let files = &self.inner.runtime.files;
        let mut fragment = self.inner.level.index().snapshot()?;
        for key in parents {
            let Some(map_file) = child_map_file(&fragment, key) else {
                return Ok(None);
            };
            match files.snapshot(&map_file) {
                Some(next) => fragment = next,
                None => return Ok(None),
            }
        }

        let Some(map_file) = child_map_file(&fragment, last) else {
            return Ok(None);
        };
        match ShardId::from_file(&map_file) {
            Some(id) => self.inner.runtime.materialize(id).map(Some),
            None => Ok(None),
        }
    }

    /// Whole subtree as a plain map
    pub fn to_value(&self) -> Result<Value> {
        self.inner.level.ensure_live()?;
        let node = self.inner.level.node().snapshot()?;
        let mut out = Map::new();
        for (key, value) in node.iter() {
            match value {
                Value::Link(node_file) => {
                    let id = ShardId::from_file(node_file)
                        .ok_or_else(|| TreeError::InvalidFileName(node_file.clone()))?;
                    let child = self.inner.runtime.materialize(id)?;
                    out.insert(key, child.to_value()?);
                }
                literal => {
                    out.insert(key, literal.clone());
                }
            }
        }
        Ok(Value::Map(out))
    }

    // =========================================================================
    // Hooks and methods
    // =========================================================================

    /// Bind `get`/`set`/`delete` interceptors to registered handler names
    pub fn define_hooks<'a, I>(&self, bindings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.inner.level.ensure_live()?;
        self.flow().set(PROXY_GROUP, bindings)
    }

    /// Remove one interceptor, or all of them when `event` is `None`
    pub fn remove_hook(&self, event: Option<&str>) -> Result<bool> {
        self.inner.level.ensure_live()?;
        self.flow().delete(PROXY_GROUP, event)
    }

    /// Inject methods backed by registered handler names
    pub fn define_methods<'a, I>(&self, bindings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.inner.level.ensure_live()?;
        self.flow().set(CALL_GROUP, bindings)
    }

    pub fn remove_method(&self, name: Option<&str>) -> Result<bool> {
        self.inner.level.ensure_live()?;
        self.flow().delete(CALL_GROUP, name)
    }

    /// Invoke an injected or shared method
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.inner.level.ensure_live()?;
        match self.method(name)? {
            Some(method) => method.call(args),
            None => Err(TreeError::NotFound(format!("method '{}'", name))),
        }
    }

    fn method(&self, name: &str) -> Result<Option<BoundMethod>> {
        let flow = self.flow();
        let injected = if flow.is_flow() {
            flow.handler(CALL_GROUP, name)?
        } else {
            None
        };
        let handler = injected.or_else(|| self.inner.runtime.shared.get(name));
        Ok(handler.map(|handler| BoundMethod {
            facade: self.clone(),
            name: name.to_string(),
            handler,
        }))
    }

    fn intercept(&self, event: &str, key: &str, args: &[Value]) -> Result<Option<Outcome>> {
        let flow = self.flow();
        if !flow.is_flow() {
            return Ok(None);
        }
        match flow.handler(PROXY_GROUP, event)? {
            Some(handler) => run_handler(&handler, self, key, args),
            None => Ok(None),
        }
    }
}

fn child_map_file(fragment: &Map, key: &str) -> Option<String> {
    if key == FILE_KEY {
        return None;
    }
    fragment.get(key).and_then(Value::as_str).map(str::to_string)
}

impl PartialEq for Facade {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Facade {}

impl fmt::Debug for Facade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Facade").field(self.id()).finish()
    }
}

//! Safe extension API for registering host functions.
//!
//! An [`Extension`] bundles synchronous ops with the lifecycle hooks that
//! attach its native state to a [`HostContext`](crate::HostContext).

use crate::error::HostResult;
use crate::value::HostValue;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub type OpResult = HostResult<HostValue>;
/// Type alias for extension initialization functions.
pub type ExtensionInitFn = Arc<dyn Fn(&ExtensionState) + Send + Sync>;
/// Runs once the context is ready to accept calls. A failure aborts context creation.
pub type ContextCreatedFn = Arc<dyn Fn(&ExtensionState) -> HostResult<()> + Send + Sync>;
/// Runs when the context is torn down. Must not fail.
pub type ContextDestroyedFn = Arc<dyn Fn(&ExtensionState) + Send + Sync>;

#[derive(Clone)]
pub struct ExtensionState {
    inner: Arc<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn put<T: Any + Send + Sync>(&self, value: T) {
        let mut map = self.inner.lock();
        map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let map = self.inner.lock();
        map.get(&TypeId::of::<T>()).and_then(|value| {
            let value = value.clone();
            value.downcast::<T>().ok()
        })
    }
}

#[derive(Clone)]
pub struct OpContext {
    state: ExtensionState,
}

impl OpContext {
    pub(crate) fn new(state: ExtensionState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ExtensionState {
        self.state.clone()
    }
}

type OpHandler = Arc<dyn Fn(OpContext, Vec<HostValue>) -> OpResult + Send + Sync>;

#[derive(Clone)]
pub struct OpDecl {
    name: String,
    handler: OpHandler,
}

impl OpDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, ctx: OpContext, args: Vec<HostValue>) -> OpResult {
        (self.handler)(ctx, args)
    }
}

/// Declare an op that runs to completion on the calling thread
pub fn op_sync<F>(name: &str, handler: F) -> OpDecl
where
    F: Fn(OpContext, Vec<HostValue>) -> OpResult + Send + Sync + 'static,
{
    OpDecl {
        name: name.to_string(),
        handler: Arc::new(handler),
    }
}

#[derive(Clone)]
pub struct Extension {
    name: String,
    ops: Vec<OpDecl>,
    init: Option<ExtensionInitFn>,
    on_created: Option<ContextCreatedFn>,
    on_destroyed: Option<ContextDestroyedFn>,
}

impl Extension {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ops: Vec::new(),
            init: None,
            on_created: None,
            on_destroyed: None,
        }
    }

    /// Get the name of this extension
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &[OpDecl] {
        &self.ops
    }

    pub fn with_ops(mut self, ops: Vec<OpDecl>) -> Self {
        self.ops = ops;
        self
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&ExtensionState) + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Hook run after every extension is installed and before the context
    /// is handed to script code.
    pub fn on_context_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExtensionState) -> HostResult<()> + Send + Sync + 'static,
    {
        self.on_created = Some(Arc::new(hook));
        self
    }

    /// Hook run exactly once when the context is destroyed.
    pub fn on_context_destroyed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExtensionState) + Send + Sync + 'static,
    {
        self.on_destroyed = Some(Arc::new(hook));
        self
    }

    pub(crate) fn init(&self) -> Option<&ExtensionInitFn> {
        self.init.as_ref()
    }

    pub(crate) fn created_hook(&self) -> Option<&ContextCreatedFn> {
        self.on_created.as_ref()
    }

    pub(crate) fn destroyed_hook(&self) -> Option<&ContextDestroyedFn> {
        self.on_destroyed.as_ref()
    }
}

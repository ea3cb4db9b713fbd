//! Host context: the op table one scripting context calls into.
//!
//! A context is created once the runtime is ready and destroyed when the
//! runtime goes away. Creation runs every extension's `on_context_created`
//! hook before returning, so no script call can observe a half-initialized
//! extension. Destruction runs the `on_context_destroyed` hooks exactly once,
//! whether triggered explicitly or by `Drop`.

use crate::error::{HostError, HostResult};
use crate::extension::{Extension, ExtensionState, OpContext, OpDecl, OpResult};
use crate::value::HostValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

static CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct HostContext {
    id: u64,
    extensions: Vec<Extension>,
    ops: HashMap<String, OpDecl>,
    state: ExtensionState,
    destroyed: AtomicBool,
}

impl HostContext {
    pub fn builder() -> HostContextBuilder {
        HostContextBuilder::default()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ExtensionState {
        self.state.clone()
    }

    pub fn has_op(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Names of all registered ops, sorted
    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke an op synchronously on the calling thread.
    pub fn call(&self, name: &str, args: Vec<HostValue>) -> OpResult {
        if self.is_destroyed() {
            return Err(HostError::ContextDestroyed);
        }
        let op = self
            .ops
            .get(name)
            .ok_or_else(|| HostError::UnknownOp(name.to_string()))?;

        trace!(context = self.id, op = name, argc = args.len(), "Calling op");
        op.invoke(OpContext::new(self.state.clone()), args)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tear the context down. Later calls fail with `ContextDestroyed`;
    /// calling this again is a no-op.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(context = self.id, "Destroying host context");

        for extension in self.extensions.iter().rev() {
            if let Some(hook) = extension.destroyed_hook() {
                hook(&self.state);
            }
        }

        debug!(context = self.id, "Host context destroyed");
    }
}

impl Drop for HostContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[derive(Default)]
pub struct HostContextBuilder {
    extensions: Vec<Extension>,
}

impl HostContextBuilder {
    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Install all extensions and run their `on_context_created` hooks.
    ///
    /// If a hook fails, the partially built context is destroyed (running
    /// the destroy hooks) and the error is returned.
    pub fn build(self) -> HostResult<HostContext> {
        let state = ExtensionState::new();
        let mut ops = HashMap::new();

        for extension in &self.extensions {
            debug!(
                extension = extension.name(),
                ops_count = extension.ops().len(),
                "Registering extension"
            );

            if let Some(init) = extension.init() {
                init(&state);
            }

            for op in extension.ops() {
                if ops.insert(op.name().to_string(), op.clone()).is_some() {
                    return Err(HostError::internal(format!(
                        "op '{}' registered twice (extension '{}')",
                        op.name(),
                        extension.name()
                    )));
                }
            }
        }

        let context = HostContext {
            id: CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            extensions: self.extensions,
            ops,
            state,
            destroyed: AtomicBool::new(false),
        };

        for extension in &context.extensions {
            if let Some(hook) = extension.created_hook() {
                hook(&context.state)?;
            }
        }

        debug!(context = context.id, "Host context ready");
        Ok(context)
    }
}

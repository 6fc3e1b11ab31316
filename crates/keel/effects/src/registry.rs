use std::collections::BTreeMap;

use tracing::debug;

use crate::context::EffectContext;
use crate::error::EffectError;
use crate::handlers;
use crate::step::{EffectResult, EffectStep};

/// Executes one effect type.
///
/// `Err` is reserved for faults; a policy refusal is a refused
/// [`EffectResult`].
pub trait EffectHandler: Send + Sync {
    fn handle(&self, step: &EffectStep, ctx: &mut EffectContext)
        -> Result<EffectResult, EffectError>;
}

impl<F> EffectHandler for F
where
    F: Fn(&EffectStep, &mut EffectContext) -> Result<EffectResult, EffectError> + Send + Sync,
{
    fn handle(
        &self,
        step: &EffectStep,
        ctx: &mut EffectContext,
    ) -> Result<EffectResult, EffectError> {
        self(step, ctx)
    }
}

/// Succeeds without producing artifacts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl EffectHandler for NoopHandler {
    fn handle(
        &self,
        step: &EffectStep,
        _ctx: &mut EffectContext,
    ) -> Result<EffectResult, EffectError> {
        Ok(EffectResult::ok(step, Vec::new()))
    }
}

/// Table from effect type to handler, built once and handed to the engine.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn EffectHandler>>,
}

impl HandlerRegistry {
    /// An empty registry; every step runs as a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in family registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        handlers::register_builtins(&mut registry);
        registry
    }

    /// Register a handler, returning the one it replaced.
    pub fn register(
        &mut self,
        effect_type: impl Into<String>,
        handler: impl EffectHandler + 'static,
    ) -> Option<Box<dyn EffectHandler>> {
        self.handlers.insert(effect_type.into(), Box::new(handler))
    }

    pub fn contains(&self, effect_type: &str) -> bool {
        self.handlers.contains_key(effect_type)
    }

    pub fn effect_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `step.effect_type`, or the no-op handler when
    /// none is registered.
    pub fn dispatch(
        &self,
        step: &EffectStep,
        ctx: &mut EffectContext,
    ) -> Result<EffectResult, EffectError> {
        match self.handlers.get(&step.effect_type) {
            Some(handler) => handler.handle(step, ctx),
            None => {
                debug!(effect_type = %step.effect_type, step_id = %step.step_id, "No handler registered, running as no-op");
                NoopHandler.handle(step, ctx)
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("effect_types", &self.effect_types())
            .finish()
    }
}

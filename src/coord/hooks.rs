//! Run lifecycle hooks
//!
//! Hooks observe a run; they never mutate coordinator state.

use async_trait::async_trait;
use std::sync::Arc;

use crate::coord::types::{ComponentConfig, ComponentEvent, EventOutcome, RunContext};

/// Observer of a coordinator run
#[async_trait]
pub trait RunHook: Send + Sync {
    /// Called once the channel is open, before the first dispatch
    async fn on_start(&self, _ctx: &RunContext, _components: usize) {}

    /// Called when a component is handed to the submitter
    async fn on_dispatch(&self, _ctx: &RunContext, _component: &ComponentConfig) {}

    /// Called for every event accepted for an in-flight component
    async fn on_event(
        &self,
        _ctx: &RunContext,
        _component: &ComponentConfig,
        _event: &ComponentEvent,
    ) {
    }

    /// Called when the run resolves, successfully or not
    async fn on_complete(&self, _ctx: &RunContext, _success: bool) {}
}

/// Composite hook that chains multiple hooks
#[derive(Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn RunHook>>,
}

impl CompositeHook {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add_hook(&mut self, hook: Arc<dyn RunHook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl RunHook for CompositeHook {
    async fn on_start(&self, ctx: &RunContext, components: usize) {
        for hook in &self.hooks {
            hook.on_start(ctx, components).await;
        }
    }

    async fn on_dispatch(&self, ctx: &RunContext, component: &ComponentConfig) {
        for hook in &self.hooks {
            hook.on_dispatch(ctx, component).await;
        }
    }

    async fn on_event(
        &self,
        ctx: &RunContext,
        component: &ComponentConfig,
        event: &ComponentEvent,
    ) {
        for hook in &self.hooks {
            hook.on_event(ctx, component, event).await;
        }
    }

    async fn on_complete(&self, ctx: &RunContext, success: bool) {
        for hook in &self.hooks {
            hook.on_complete(ctx, success).await;
        }
    }
}

/// Logging hook
pub struct LoggingHook;

#[async_trait]
impl RunHook for LoggingHook {
    async fn on_start(&self, ctx: &RunContext, components: usize) {
        tracing::info!(
            "Run {} started: {} component(s), {} direction",
            ctx.run_id,
            components,
            ctx.direction
        );
    }

    async fn on_dispatch(&self, ctx: &RunContext, component: &ComponentConfig) {
        tracing::info!("[{}] Dispatched ({})", component.name, ctx.run_id);
    }

    async fn on_event(
        &self,
        _ctx: &RunContext,
        component: &ComponentConfig,
        event: &ComponentEvent,
    ) {
        match &event.outcome {
            EventOutcome::Finished => tracing::debug!("[{}] Finished", component.name),
            EventOutcome::Failed { message } => {
                tracing::error!("[{}] Failed: {}", component.name, message)
            }
        }
    }

    async fn on_complete(&self, ctx: &RunContext, success: bool) {
        let elapsed = chrono::Utc::now() - ctx.started_at;
        if success {
            tracing::info!("Run {} succeeded in {}ms", ctx.run_id, elapsed.num_milliseconds());
        } else {
            tracing::warn!("Run {} failed after {}ms", ctx.run_id, elapsed.num_milliseconds());
        }
    }
}

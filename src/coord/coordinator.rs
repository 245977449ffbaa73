//! Coordinator - dependency-aware execution of a component graph
//!
//! The Coordinator turns a dependency table into a live schedule: it submits
//! every unblocked component, listens on the run's event channel, unblocks
//! dependents as components finish, and resolves once nothing is pending or
//! in flight. All run state is owned by a single loop, so submissions and
//! channel frames are processed one at a time.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::DeployConfig;
use crate::core::errors::{ErrorRecord, FailureKind, Result, StackError};
use crate::coord::aggregator::ErrorAggregator;
use crate::coord::channel::{parse_frame, EventChannel, EventStream, TicketService};
use crate::coord::credentials::{bind_credentials, WorkerCredentials};
use crate::coord::graph::{self, DependencyTable};
use crate::coord::hooks::{CompositeHook, RunHook};
use crate::coord::preflight::{AccountDirectory, PreflightValidator};
use crate::coord::submitter::{Acknowledgement, RemoteSubmitter, SubmitRequest};
use crate::coord::types::{
    ComponentConfig, ComponentEvent, ComponentId, ComponentSet, Direction, EventOutcome,
    RunContext,
};

type Submission = BoxFuture<'static, (ComponentId, Result<Acknowledgement>)>;

/// Coordinator for dependency-ordered remote execution
pub struct Coordinator {
    config: DeployConfig,
    submitter: Arc<dyn RemoteSubmitter>,
    channel: Arc<dyn EventChannel>,
    tickets: Arc<dyn TicketService>,
    accounts: Arc<dyn AccountDirectory>,
    hooks: CompositeHook,
}

impl Coordinator {
    pub fn new(
        config: DeployConfig,
        submitter: Arc<dyn RemoteSubmitter>,
        channel: Arc<dyn EventChannel>,
        tickets: Arc<dyn TicketService>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            config,
            submitter,
            channel,
            tickets,
            accounts,
            hooks: CompositeHook::new(),
        }
    }

    /// Register a lifecycle hook
    pub fn with_hook(mut self, hook: Arc<dyn RunHook>) -> Self {
        self.hooks.add_hook(hook);
        self
    }

    /// Run every component of `components` in `direction`.
    ///
    /// Resolves once every component finished. If any component failed the
    /// error is [`StackError::ComponentsFailed`] with all failures in arrival
    /// order, reported only after every dispatched component has settled.
    pub async fn run(
        &self,
        components: &ComponentSet,
        direction: Direction,
        actions: &[String],
    ) -> Result<()> {
        let known: BTreeSet<ComponentId> = components.keys().cloned().collect();
        self.run_selection(components, &known, direction, actions).await
    }

    /// Run a selection out of a larger project whose component ids are `known`.
    ///
    /// Dependencies on known components outside the selection count as done.
    pub async fn run_selection(
        &self,
        components: &ComponentSet,
        known: &BTreeSet<ComponentId>,
        direction: Direction,
        actions: &[String],
    ) -> Result<()> {
        self.config.validate()?;
        let accounts = PreflightValidator::new(&self.config)
            .validate(components, self.accounts.as_ref())
            .await?;
        let table = graph::build_with_known(components, known, direction)?;
        let credentials = bind_credentials(&self.config, components, &accounts)?;

        if table.is_empty() {
            tracing::info!("Nothing to run: no components selected");
            return Ok(());
        }

        let ticket = self.tickets.create_ticket().await?;
        let events = self.channel.open(&ticket).await?;
        let ctx = RunContext::new(ticket, direction);

        let mut state = RunState {
            ctx,
            components,
            table,
            in_flight: HashSet::new(),
            submitting: HashSet::new(),
            errors: ErrorAggregator::new(),
            credentials,
            actions: actions.to_vec(),
        };

        self.hooks.on_start(&state.ctx, components.len()).await;
        let result = self.drive(&mut state, events).await;
        self.hooks.on_complete(&state.ctx, result.is_ok()).await;

        result
    }

    async fn drive(&self, state: &mut RunState<'_>, mut events: EventStream) -> Result<()> {
        let mut submissions: FuturesUnordered<Submission> = FuturesUnordered::new();
        let action = self.config.deployer_action.as_str();
        let idle = self.config.event_idle_timeout;

        self.dispatch_ready(state, &mut submissions).await;

        loop {
            if let Some(resolution) = state.resolution() {
                return resolution;
            }

            // The idle window only runs once every submit call has returned
            let window = if submissions.is_empty() { idle } else { None };
            let step = tokio::select! {
                Some((id, result)) = submissions.next(), if !submissions.is_empty() => {
                    Step::Submitted(id, result)
                }
                frame = next_frame(&mut events, window) => Step::Frame(frame?),
            };

            let accepted = match step {
                Step::Submitted(id, result) => state.on_submitted(id, result),
                Step::Frame(None) => {
                    return Err(StackError::channel(
                        state.ctx.ticket.ticket_id.clone(),
                        format!(
                            "event channel closed with {} component(s) in flight",
                            state.in_flight.len()
                        ),
                    ));
                }
                Step::Frame(Some(frame)) => match parse_frame(&frame, action)? {
                    Some(event) => state.on_event(event),
                    None => None,
                },
            };

            if let Some(event) = accepted {
                if let Some(component) = state.components.get(&event.component_id) {
                    self.hooks.on_event(&state.ctx, component, &event).await;
                }
            }

            self.dispatch_ready(state, &mut submissions).await;
        }
    }

    /// Submit every component whose blocking set is empty
    async fn dispatch_ready(
        &self,
        state: &mut RunState<'_>,
        submissions: &mut FuturesUnordered<Submission>,
    ) {
        let components = state.components;
        for id in state.table.ready() {
            state.table.take(&id);
            let Some(component) = components.get(&id) else {
                continue;
            };
            state.in_flight.insert(id.clone());
            state.submitting.insert(id.clone());

            let request = SubmitRequest {
                component_id: id.clone(),
                run_id: state.ctx.run_id.clone(),
                actions: state.actions.clone(),
                config: component.clone(),
                credentials: state.credentials.get(&id).cloned().unwrap_or_default(),
            };
            // Spawned so the request goes out now, not when the loop next polls it
            let submitter = self.submitter.clone();
            let handle = tokio::spawn(async move { submitter.submit(request).await });
            let name = component.name.clone();
            submissions.push(
                handle
                    .map(move |joined| {
                        let result = joined.unwrap_or_else(|e| {
                            Err(StackError::submission(
                                name,
                                format!("submission task failed: {}", e),
                            ))
                        });
                        (id, result)
                    })
                    .boxed(),
            );

            tracing::debug!("[{}] Submitted, {} in flight", component.name, state.in_flight.len());
            self.hooks.on_dispatch(&state.ctx, component).await;
        }
    }
}

enum Step {
    Submitted(ComponentId, Result<Acknowledgement>),
    Frame(Option<String>),
}

async fn next_frame(events: &mut EventStream, idle: Option<Duration>) -> Result<Option<String>> {
    match idle {
        Some(window) => tokio::time::timeout(window, events.next()).await.map_err(|_| {
            StackError::timeout("waiting for component events", window.as_millis() as u64)
        }),
        None => Ok(events.next().await),
    }
}

/// State of one run, owned by the coordinator loop
struct RunState<'a> {
    ctx: RunContext,
    components: &'a ComponentSet,
    table: DependencyTable,
    /// Dispatched and waiting for a completion event
    in_flight: HashSet<ComponentId>,
    /// Submit call not yet returned
    submitting: HashSet<ComponentId>,
    errors: ErrorAggregator,
    credentials: HashMap<ComponentId, WorkerCredentials>,
    actions: Vec<String>,
}

impl RunState<'_> {
    fn name_of(&self, id: &ComponentId) -> String {
        self.components
            .get(id)
            .map(|c: &ComponentConfig| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Terminal result once nothing is pending, in flight or still submitting
    fn resolution(&mut self) -> Option<Result<()>> {
        if !self.in_flight.is_empty() || !self.submitting.is_empty() {
            return None;
        }
        if !self.table.is_empty() {
            return Some(Err(StackError::internal(format!(
                "{} component(s) blocked with nothing in flight",
                self.table.len()
            ))));
        }
        if self.errors.has_errors() {
            let records = std::mem::take(&mut self.errors).into_records();
            return Some(Err(StackError::ComponentsFailed(records)));
        }
        Some(Ok(()))
    }

    fn on_submitted(
        &mut self,
        id: ComponentId,
        result: Result<Acknowledgement>,
    ) -> Option<ComponentEvent> {
        self.submitting.remove(&id);
        let name = self.name_of(&id);
        match result {
            Ok(ack) => {
                tracing::info!("[{}] {}", name, ack.message);
                None
            }
            Err(e) => {
                let message = e.to_string();
                let awaiting_event = self.in_flight.remove(&id);
                self.fail(&id, &name, &message, FailureKind::Submission);
                if !awaiting_event {
                    // Completion was already reported; the failure still counts
                    tracing::warn!("[{}] Submission failed after the component reported", name);
                    return None;
                }
                Some(ComponentEvent::failed(id, message).with_run_id(self.ctx.run_id.clone()))
            }
        }
    }

    fn on_event(&mut self, event: ComponentEvent) -> Option<ComponentEvent> {
        if let Some(run_id) = &event.run_id {
            if *run_id != self.ctx.run_id {
                tracing::debug!("Discarding event for {} from run {}", event.component_id, run_id);
                return None;
            }
        }
        if !self.in_flight.remove(&event.component_id) {
            tracing::debug!("Discarding event for {}: not in flight", event.component_id);
            return None;
        }

        let name = self.name_of(&event.component_id);
        match &event.outcome {
            EventOutcome::Finished => {
                let unblocked = self.table.unblock(&event.component_id);
                if !self.errors.has_errors() {
                    tracing::info!("[{}] Successfully deployed!", name);
                }
                tracing::debug!("[{}] Unblocked {} entr(ies)", name, unblocked);
            }
            EventOutcome::Failed { message } => {
                self.fail(&event.component_id, &name, message, FailureKind::RemoteExecution);
            }
        }
        Some(event)
    }

    /// Record a failure and stop every not-yet-dispatched component
    fn fail(&mut self, id: &ComponentId, name: &str, message: &str, kind: FailureKind) {
        tracing::error!("[{}] {} failure: {}", name, kind, message);
        self.errors
            .push(ErrorRecord::new(id.as_str(), name, message, kind));

        let dropped = self.table.clear();
        if !dropped.is_empty() {
            tracing::warn!(
                "Fail-fast: {} pending component(s) will not be dispatched, {} still in flight",
                dropped.len(),
                self.in_flight.len()
            );
        }
    }
}

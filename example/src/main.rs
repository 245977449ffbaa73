use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use stackrun::core::logging;
use stackrun::{
    component_set, AccountSet, ComponentConfig, ComponentWorker, Coordinator, DeployConfig,
    Direction, LocalSubmitter, MemoryEventChannel, MemoryTicketService, StackError,
    StaticAccountDirectory, SubmitRequest,
};

#[derive(Deserialize)]
struct StackFile {
    accounts: AccountSet,
    components: Vec<ComponentConfig>,
}

/// Pretends to provision a component
struct SleepyWorker;

#[async_trait]
impl ComponentWorker for SleepyWorker {
    fn name(&self) -> &str {
        "sleepy-worker"
    }

    async fn execute(&self, request: &SubmitRequest) -> anyhow::Result<()> {
        tracing::info!(
            "[{}] {} with account {:?}",
            request.config.name,
            request.actions.join(" + "),
            request.credentials.account
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

fn coordinator(config: &DeployConfig, accounts: &AccountSet) -> Coordinator {
    let (channel, publisher) = MemoryEventChannel::new();
    let submitter = LocalSubmitter::new(
        Arc::new(SleepyWorker),
        publisher,
        config.deployer_action.clone(),
    );

    Coordinator::new(
        config.clone(),
        Arc::new(submitter),
        Arc::new(channel),
        Arc::new(MemoryTicketService),
        Arc::new(StaticAccountDirectory::new(accounts.clone())),
    )
    .with_hook(Arc::new(stackrun::LoggingHook))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "stack.yaml".to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let stack: StackFile = serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path))?;
    let components = component_set(stack.components);

    let config = DeployConfig::builder()
        .logs(true)
        .event_idle_timeout(Some(Duration::from_secs(30)))
        .build()?;

    // Each run opens its own channel
    for (direction, action) in [(Direction::Forward, "apply"), (Direction::Reverse, "destroy")] {
        let result = coordinator(&config, &stack.accounts)
            .run(&components, direction, &[action.to_string()])
            .await;

        match result {
            Ok(()) => tracing::info!("{} finished", action),
            Err(StackError::ComponentsFailed(records)) => {
                for record in &records {
                    tracing::error!("{}", record);
                }
                anyhow::bail!("{} failed for {} component(s)", action, records.len());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

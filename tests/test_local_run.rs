//! End-to-end runs through the in-process submitter and memory channel

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use stackrun::{
    component_set, Account, AccountSet, ComponentConfig, ComponentEvent, ComponentSet,
    ComponentWorker, Coordinator, DeployConfig, Direction, FailureKind, LocalSubmitter,
    MemoryEventChannel, MemoryTicketService, RunContext, RunHook, StackError,
    StaticAccountDirectory, SubmitRequest,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Worker recording the order components were executed in
struct RecordingWorker {
    executed: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl RecordingWorker {
    fn new(fail_on: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            fail_on,
        })
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComponentWorker for RecordingWorker {
    fn name(&self) -> &str {
        "recording-worker"
    }

    async fn execute(&self, request: &SubmitRequest) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let id = request.component_id.as_str().to_string();
        self.executed.lock().unwrap().push(id.clone());

        if self.fail_on == Some(id.as_str()) {
            anyhow::bail!("terraform apply exited with status 1");
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHook {
    started: Mutex<Option<usize>>,
    dispatched: Mutex<Vec<String>>,
    events: Mutex<usize>,
    completed: Mutex<Option<bool>>,
}

#[async_trait]
impl RunHook for RecordingHook {
    async fn on_start(&self, _ctx: &RunContext, components: usize) {
        *self.started.lock().unwrap() = Some(components);
    }

    async fn on_dispatch(&self, _ctx: &RunContext, component: &ComponentConfig) {
        self.dispatched.lock().unwrap().push(component.name.clone());
    }

    async fn on_event(
        &self,
        _ctx: &RunContext,
        _component: &ComponentConfig,
        _event: &ComponentEvent,
    ) {
        *self.events.lock().unwrap() += 1;
    }

    async fn on_complete(&self, _ctx: &RunContext, success: bool) {
        *self.completed.lock().unwrap() = Some(success);
    }
}

fn coordinator(worker: Arc<RecordingWorker>) -> Coordinator {
    let config = DeployConfig::builder()
        .logs(true)
        .event_idle_timeout(Some(Duration::from_secs(5)))
        .build()
        .unwrap();
    let (channel, publisher) = MemoryEventChannel::new();
    let submitter = LocalSubmitter::new(worker, publisher, config.deployer_action.clone());
    let accounts = AccountSet::new().with_accounts(
        "aws",
        vec![Account::new("1", "base"), Account::role("2", "deployer", "1")],
    );

    Coordinator::new(
        config,
        Arc::new(submitter),
        Arc::new(channel),
        Arc::new(MemoryTicketService),
        Arc::new(StaticAccountDirectory::new(accounts)),
    )
}

/// a <- b, a <- c, (b, c) <- d
fn diamond() -> ComponentSet {
    component_set(vec![
        ComponentConfig::new("a", "network").with_cloud_account("base"),
        ComponentConfig::new("b", "database")
            .with_dependencies(["a"])
            .with_cloud_account("deployer"),
        ComponentConfig::new("c", "cache")
            .with_dependencies(["a"])
            .with_cloud_account("base"),
        ComponentConfig::new("d", "service")
            .with_dependencies(["b", "c"])
            .with_cloud_account("deployer"),
    ])
}

fn position(order: &[String], id: &str) -> usize {
    order.iter().position(|x| x == id).unwrap()
}

#[tokio::test]
async fn test_diamond_runs_each_component_once_in_order() {
    let worker = RecordingWorker::new(None);
    let hook = Arc::new(RecordingHook::default());
    let coordinator = coordinator(worker.clone()).with_hook(hook.clone());

    coordinator
        .run(&diamond(), Direction::Forward, &["apply".to_string()])
        .await
        .unwrap();

    let order = worker.executed();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "a");
    assert_eq!(order[3], "d");
    assert!(position(&order, "b") < position(&order, "d"));
    assert!(position(&order, "c") < position(&order, "d"));

    assert_eq!(*hook.started.lock().unwrap(), Some(4));
    assert_eq!(hook.dispatched.lock().unwrap().len(), 4);
    assert_eq!(*hook.events.lock().unwrap(), 4);
    assert_eq!(*hook.completed.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_reverse_diamond_runs_dependents_first() {
    let worker = RecordingWorker::new(None);
    let coordinator = coordinator(worker.clone());

    coordinator
        .run(&diamond(), Direction::Reverse, &["destroy".to_string()])
        .await
        .unwrap();

    let order = worker.executed();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "d");
    assert_eq!(order[3], "a");
}

#[tokio::test]
async fn test_worker_failure_stops_downstream_components() {
    let worker = RecordingWorker::new(Some("b"));
    let hook = Arc::new(RecordingHook::default());
    let coordinator = coordinator(worker.clone()).with_hook(hook.clone());

    let err = coordinator
        .run(&diamond(), Direction::Forward, &["apply".to_string()])
        .await
        .unwrap_err();

    let records = match err {
        StackError::ComponentsFailed(records) => records,
        other => panic!("unexpected error: {}", other),
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].component_name, "database");
    assert_eq!(records[0].kind, FailureKind::RemoteExecution);
    assert!(records[0].message.contains("exited with status 1"));

    // c was already in flight next to b and is allowed to finish
    let order = worker.executed();
    assert!(!order.contains(&"d".to_string()));
    assert!(order.contains(&"c".to_string()));
    assert_eq!(*hook.completed.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_role_credentials_reach_the_worker() {
    struct EnvCheck(Mutex<Vec<(String, Option<String>)>>);

    #[async_trait]
    impl ComponentWorker for EnvCheck {
        fn name(&self) -> &str {
            "env-check"
        }

        async fn execute(&self, request: &SubmitRequest) -> anyhow::Result<()> {
            self.0.lock().unwrap().push((
                request.component_id.as_str().to_string(),
                request.credentials.source_profile.clone(),
            ));
            Ok(())
        }
    }

    let config = DeployConfig::builder().logs(true).build().unwrap();
    let (channel, publisher) = MemoryEventChannel::new();
    let worker = Arc::new(EnvCheck(Mutex::new(Vec::new())));
    let submitter = LocalSubmitter::new(worker.clone(), publisher, config.deployer_action.clone());
    let accounts = AccountSet::new().with_accounts(
        "aws",
        vec![Account::new("1", "base"), Account::role("2", "deployer", "1")],
    );
    let coordinator = Coordinator::new(
        config,
        Arc::new(submitter),
        Arc::new(channel),
        Arc::new(MemoryTicketService),
        Arc::new(StaticAccountDirectory::new(accounts)),
    );

    let components = component_set(vec![
        ComponentConfig::new("a", "network").with_cloud_account("base"),
        ComponentConfig::new("b", "database")
            .with_dependencies(["a"])
            .with_cloud_account("deployer"),
    ]);
    coordinator
        .run(&components, Direction::Forward, &["apply".to_string()])
        .await
        .unwrap();

    let seen = worker.0.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), None),
            ("b".to_string(), Some("base".to_string())),
        ]
    );
}

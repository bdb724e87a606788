use super::*;
use crate::convergence::{PollPolicy, PollState, Readiness, DETAIL_NOT_FOUND};
use crate::error::{DispatchError, SourceError};
use crate::models::{EntityIdentity, EntityKind, InventoryRecord, LiveRecord};
use crate::reconcile::Reconciler;
use crate::source::{CommandAck, CommandBackend, InventorySource, LiveSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory cluster: serves live reads and applies commands to itself
struct FakeCluster {
    live: Mutex<Vec<LiveRecord>>,
    reject: AtomicBool,
    executed: AtomicUsize,
}

impl FakeCluster {
    fn new(live: Vec<LiveRecord>) -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(live),
            reject: AtomicBool::new(false),
            executed: AtomicUsize::new(0),
        })
    }

    fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    fn remove(&self, identity: &EntityIdentity) {
        self.live.lock().unwrap().retain(|r| &r.identity != identity);
    }
}

#[async_trait]
impl InventorySource for FakeCluster {
    async fn list_inventory(&self, _kind: EntityKind) -> Result<Vec<InventoryRecord>, SourceError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl LiveSource for FakeCluster {
    async fn list_live(&self, kind: EntityKind) -> Result<Vec<LiveRecord>, SourceError> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.identity.kind == kind)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommandBackend for FakeCluster {
    async fn execute(
        &self,
        identity: &EntityIdentity,
        command: &Command,
    ) -> Result<CommandAck, SourceError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                url: "http://backend/api/v1/commands".to_string(),
                status: 409,
                body: "conflict".to_string(),
            });
        }

        match command {
            Command::Delete => self.remove(identity),
            Command::Scale { replicas } => {
                let mut live = self.live.lock().unwrap();
                for record in live.iter_mut().filter(|r| &r.identity == identity) {
                    *record = LiveRecord::new(identity.clone()).with_replicas(*replicas, *replicas);
                }
            }
            _ => {}
        }

        Ok(CommandAck {
            message: Some(format!("{} accepted", command.name())),
        })
    }
}

fn web() -> EntityIdentity {
    EntityIdentity::namespaced(EntityKind::Deployment, "shop", "web")
}

fn dns_pod() -> EntityIdentity {
    EntityIdentity::namespaced(EntityKind::Pod, "kube-system", "coredns-1")
}

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        poll_policy: PollPolicy::default()
            .with_interval(Duration::from_millis(5))
            .with_max_attempts(20),
        ..DispatchConfig::default()
    }
}

fn dispatcher(cluster: Arc<FakeCluster>, config: DispatchConfig) -> CommandDispatcher {
    let reconciler = Arc::new(Reconciler::builder().sources(cluster.clone()).build().unwrap());
    CommandDispatcher::builder()
        .backend(cluster)
        .reconciler(reconciler)
        .config(config)
        .build()
        .unwrap()
}

#[test]
fn test_command_wire_format() {
    let json = serde_json::to_value(Command::Scale { replicas: 3 }).unwrap();
    assert_eq!(json, serde_json::json!({"command": "scale", "replicas": 3}));

    let parsed: Command =
        serde_json::from_str(r#"{"command":"updateImage","image":"nginx:1.27"}"#).unwrap();
    assert_eq!(
        parsed,
        Command::UpdateImage {
            container: None,
            image: "nginx:1.27".to_string()
        }
    );
    assert_eq!(parsed.path_segment(), "update-image");
}

#[test]
fn test_kind_support_table() {
    let scale = Command::Scale { replicas: 1 };
    assert!(scale.supports(EntityKind::StatefulSet));
    assert!(!scale.supports(EntityKind::DaemonSet));

    assert!(Command::Restart.supports(EntityKind::DaemonSet));
    assert!(!Command::Restart.supports(EntityKind::Pod));

    assert!(Command::Suspend.supports(EntityKind::CronJob));
    assert!(!Command::Resume.supports(EntityKind::Job));

    for kind in EntityKind::ALL {
        assert!(Command::Delete.supports(kind));
    }
}

#[test]
fn test_long_rollout_policy() {
    let config = DispatchConfig::default();
    let image = Command::UpdateImage {
        container: None,
        image: "agent:2".to_string(),
    };

    assert_eq!(config.policy_for(&image, EntityKind::DaemonSet).max_attempts, 90);
    assert_eq!(config.policy_for(&image, EntityKind::StatefulSet).max_attempts, 90);
    assert_eq!(config.policy_for(&image, EntityKind::Deployment).max_attempts, 60);
    assert_eq!(config.policy_for(&Command::Restart, EntityKind::DaemonSet).max_attempts, 60);
}

#[tokio::test]
async fn test_scale_up_tracks_convergence() {
    let cluster = FakeCluster::new(vec![LiveRecord::new(web()).with_replicas(1, 1)]);
    let dispatcher = dispatcher(cluster.clone(), fast_config());

    let outcome = dispatcher
        .dispatch(Command::Scale { replicas: 3 }, web())
        .await
        .unwrap();
    assert_eq!(outcome.ack().message.as_deref(), Some("scale accepted"));

    let DispatchOutcome::Converging { session, .. } = outcome else {
        panic!("scale should start a poll session");
    };
    let result = session.wait().await;

    assert_eq!(result.state, PollState::Ready);
    assert_eq!(result.view.unwrap().replicas().unwrap().ready, 3);
}

#[tokio::test]
async fn test_scale_to_zero_settles_on_first_observation() {
    let cluster = FakeCluster::new(vec![LiveRecord::new(web()).with_replicas(2, 2)]);
    let dispatcher = dispatcher(cluster, fast_config());

    let outcome = dispatcher
        .dispatch(Command::Scale { replicas: 0 }, web())
        .await
        .unwrap();

    let DispatchOutcome::Converging { session, .. } = outcome else {
        panic!("scale to zero should be observed through the poller");
    };
    let result = session.wait().await;

    assert_eq!(result.state, PollState::Ready);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn test_delete_reloads_owning_stream() {
    let pod = EntityIdentity::namespaced(EntityKind::Pod, "shop", "web-1");
    let cluster = FakeCluster::new(vec![LiveRecord::new(pod.clone()).with_status("Running")]);
    let dispatcher = dispatcher(cluster, fast_config());

    let outcome = dispatcher.dispatch(Command::Delete, pod.clone()).await.unwrap();

    let DispatchOutcome::Applied { reload, .. } = outcome else {
        panic!("delete should reload once");
    };
    let reloaded = reload.await.unwrap();
    let set = reloaded.applied().expect("reload commits");
    assert!(set.find(&pod).is_none());
    assert!(!dispatcher.poller().is_polling(&pod));
}

#[tokio::test]
async fn test_deleted_entity_ends_running_session_as_gone() {
    let pod = EntityIdentity::namespaced(EntityKind::Pod, "shop", "web-1");
    let cluster = FakeCluster::new(vec![LiveRecord::new(pod.clone()).with_status("Pending")]);
    let dispatcher = dispatcher(cluster, fast_config());

    let session = dispatcher.poller().poll(
        pod.clone(),
        Readiness::PodRunning,
        PollPolicy::default()
            .with_interval(Duration::from_millis(20))
            .with_max_attempts(20),
    );

    dispatcher.dispatch(Command::Delete, pod).await.unwrap();

    let result = session.wait().await;
    assert_eq!(result.state, PollState::EntityGone);
    assert_eq!(result.detail, DETAIL_NOT_FOUND);
}

#[tokio::test]
async fn test_protected_namespace_refuses_delete() {
    let cluster = FakeCluster::new(vec![LiveRecord::new(dns_pod()).with_status("Running")]);
    let dispatcher = dispatcher(cluster.clone(), fast_config());

    let err = dispatcher.dispatch(Command::Delete, dns_pod()).await.unwrap_err();

    assert!(matches!(err, DispatchError::ProtectedNamespace { .. }));
    assert!(err.is_validation());
    assert_eq!(cluster.executed(), 0);
}

#[tokio::test]
async fn test_allow_listed_identity_bypasses_protection() {
    let cluster = FakeCluster::new(vec![LiveRecord::new(dns_pod()).with_status("Running")]);
    let mut config = fast_config();
    config.allow_list.insert(dns_pod().to_string());
    let dispatcher = dispatcher(cluster.clone(), config);

    assert!(dispatcher.dispatch(Command::Delete, dns_pod()).await.is_ok());
    assert_eq!(cluster.executed(), 1);
}

#[tokio::test]
async fn test_protected_namespace_itself_is_protected() {
    let cluster = FakeCluster::new(vec![]);
    let dispatcher = dispatcher(cluster.clone(), fast_config());
    let namespace = EntityIdentity::cluster(EntityKind::Namespace, "kube-public");

    let err = dispatcher.dispatch(Command::Delete, namespace).await.unwrap_err();
    assert!(matches!(err, DispatchError::ProtectedNamespace { .. }));
    assert_eq!(cluster.executed(), 0);
}

#[tokio::test]
async fn test_local_validation_failures() {
    let cluster = FakeCluster::new(vec![]);
    let dispatcher = dispatcher(cluster.clone(), fast_config());

    let daemonset = EntityIdentity::namespaced(EntityKind::DaemonSet, "ops", "agent");
    let err = dispatcher
        .dispatch(Command::Scale { replicas: 2 }, daemonset)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unsupported { command: "scale", .. }));

    let namespaced_node = EntityIdentity::namespaced(EntityKind::Node, "default", "n1");
    let err = dispatcher.dispatch(Command::Delete, namespaced_node).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidIdentity(_)));

    let err = dispatcher
        .dispatch(
            Command::UpdateImage {
                container: None,
                image: "  ".to_string(),
            },
            web(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArguments(_)));

    assert_eq!(cluster.executed(), 0);
}

#[tokio::test]
async fn test_backend_rejection_starts_no_session() {
    let cluster = FakeCluster::new(vec![LiveRecord::new(web()).with_replicas(1, 1)]);
    cluster.reject.store(true, Ordering::SeqCst);
    let dispatcher = dispatcher(cluster.clone(), fast_config());

    let err = dispatcher.dispatch(Command::Restart, web()).await.unwrap_err();

    assert!(matches!(err, DispatchError::Rejected { command: "restart", .. }));
    assert!(!err.is_validation());
    assert_eq!(cluster.executed(), 1);
    assert!(!dispatcher.poller().is_polling(&web()));
}

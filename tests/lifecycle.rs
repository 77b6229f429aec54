//! Step Lifecycle Integration Tests
//!
//! Drives plan / apply / destroy through the StepController against an
//! in-memory state store and a scripted executor gateway.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use terrastep::adapters::{
    Connector, FeatureFlag, GatewayError, MemoryStateFiles, StateFileService, StaticConnectors,
    StaticFeatureFlags, TaskGateway,
};
use tempfile::TempDir;
use terrastep::core::{
    InheritedStateStore, JsonlStateFiles, JsonlStateStore, MemoryStateStore, Orchestrator,
    PipelineStep, ProvisionPipeline, StepController, StepError,
};
use terrastep::domain::{
    EncryptedRecord, ExecutionContext, FetchType, GitConnectionType, RunState, StepSpec,
    StepStatus, StoreKind, TaskCommand, TaskDescriptor, TaskResponse, UnitProgress,
};

const TIMEOUT: Duration = Duration::from_secs(600);

const PLAN_STEP: &str = r#"
type: plan
provisioner_identifier: network
configuration:
  command: apply
  secret_manager_ref: account.vault
  workspace: dev
  config_files:
    store:
      connector_ref: git
      fetch_type: branch
      branch: main
      folder_path: network/
  var_files:
    - identifier: defaults
      type: inline
      content: "region = \"eu-west-1\""
    - identifier: shared
      type: remote
      store:
        connector_ref: account.shared
        fetch_type: branch
        branch: main
        repo_name: /vars
        paths: [shared.tfvars]
  environment_variables:
    TF_LOG: DEBUG
    RETRIES: 3
"#;

const APPLY_FROM_PLAN: &str = r#"
type: apply
provisioner_identifier: network
configuration_type: INHERIT_FROM_PLAN
"#;

const DESTROY_FROM_PLAN: &str = r#"
type: destroy
provisioner_identifier: network
configuration_type: INHERIT_FROM_PLAN
"#;

const DESTROY_FROM_APPLY: &str = r#"
type: destroy
provisioner_identifier: network
configuration_type: INHERIT_FROM_APPLY
"#;

const APPLY_INLINE: &str = r#"
type: apply
provisioner_identifier: network
configuration_type: INLINE
spec:
  workspace: prod
  config_files:
    store:
      connector_ref: git
      fetch_type: branch
      branch: release
      folder_path: network/
  backend_config:
    type: inline
    content: "bucket = \"tf-state\""
"#;

/// Gateway that records every task and replies from a script
#[derive(Default)]
struct ScriptedGateway {
    tasks: Mutex<Vec<TaskDescriptor>>,
    replies: Mutex<VecDeque<Result<TaskResponse, GatewayError>>>,
}

impl ScriptedGateway {
    fn reply(&self, reply: Result<TaskResponse, GatewayError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn calls(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    fn last_task(&self) -> TaskDescriptor {
        self.tasks.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl TaskGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, task: &TaskDescriptor) -> Result<TaskResponse, GatewayError> {
        self.tasks.lock().unwrap().push(task.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(response("SUCCESS", &[])))
    }
}

struct Harness {
    ctx: ExecutionContext,
    store: Arc<MemoryStateStore>,
    gateway: Arc<ScriptedGateway>,
    state_files: Arc<MemoryStateFiles>,
    controller: StepController,
}

fn connectors() -> StaticConnectors {
    StaticConnectors::new()
        .with_connector(
            "git",
            Connector {
                name: "infra-repo".to_string(),
                kind: StoreKind::Git,
                url: "https://git.example.com/acme/infra".to_string(),
                connection_type: GitConnectionType::Repo,
                credentials: serde_json::json!({"username": "bot"}),
            },
        )
        .with_connector(
            "account.shared",
            Connector {
                name: "acme-account".to_string(),
                kind: StoreKind::Git,
                url: "https://git.example.com/org/".to_string(),
                connection_type: GitConnectionType::Account,
                credentials: serde_json::Value::Null,
            },
        )
}

fn harness_with_flags(flags: StaticFeatureFlags) -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let gateway = Arc::new(ScriptedGateway::default());
    let state_files = Arc::new(MemoryStateFiles::new());

    let controller = StepController::new(
        store.clone(),
        gateway.clone(),
        Arc::new(connectors()),
        state_files.clone(),
        Arc::new(flags),
    );

    Harness {
        ctx: ExecutionContext::new("acc", "org", "proj", "exec-1"),
        store,
        gateway,
        state_files,
        controller,
    }
}

fn harness() -> Harness {
    harness_with_flags(StaticFeatureFlags::new())
}

fn step(yaml: &str) -> StepSpec {
    serde_yaml::from_str(yaml).unwrap()
}

fn response(status: &str, commits: &[(&str, &str)]) -> TaskResponse {
    TaskResponse {
        status: status.to_string(),
        commit_id_for_config_files: commits
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        outputs: None,
        state_file_id: None,
        encrypted_plan: None,
        unit_progress: vec![UnitProgress {
            unit_name: "Fetch Files".to_string(),
            status: "SUCCESS".to_string(),
            started_at: Some(Utc::now()),
            ended_at: Some(Utc::now()),
        }],
        error_message: None,
    }
}

fn plan_success() -> TaskResponse {
    TaskResponse {
        encrypted_plan: Some(EncryptedRecord {
            name: "apply-plan-exec-1".to_string(),
            encrypted_value: "ciphertext".to_string(),
            kms_key_id: None,
        }),
        ..response("SUCCESS", &[("CONFIG_FILES", "c0"), ("VAR_FILES_1", "c1")])
    }
}

const ENTITY: &str = "acc/org/proj/network";

#[tokio::test]
async fn test_plan_apply_destroy_sequence() {
    let h = harness();

    // Plan
    h.gateway.reply(Ok(plan_success()));
    let outcome = h.controller.execute(&h.ctx, &step(PLAN_STEP), TIMEOUT).await;
    assert_eq!(outcome.status, StepStatus::Succeeded);

    let plan_task = h.gateway.last_task();
    assert_eq!(plan_task.parameters.command, TaskCommand::Plan);
    assert_eq!(plan_task.parameters.inline_var_files.len(), 1);
    assert_eq!(plan_task.parameters.remote_var_files[0].identifier, "VAR_FILES_1");
    assert_eq!(
        plan_task.parameters.remote_var_files[0].store.url,
        "https://git.example.com/org/vars"
    );
    assert_eq!(plan_task.parameters.environment_variables["RETRIES"], "3");
    assert_eq!(plan_task.parameters.plan_name.as_deref(), Some("apply-plan-exec-1"));

    let handoff = h.store.inherit_output(ENTITY, "exec-1").await.unwrap();
    assert_eq!(handoff.workspace.as_deref(), Some("dev"));
    assert_eq!(handoff.var_file_configs.len(), 2);
    assert_eq!(handoff.encryption_config.reference, "acc/vault");

    // Apply from plan
    h.gateway.reply(Ok(TaskResponse {
        state_file_id: Some("state-1".to_string()),
        ..response("SUCCESS", &[])
    }));
    let outcome = h
        .controller
        .execute(&h.ctx, &step(APPLY_FROM_PLAN), TIMEOUT)
        .await;
    assert_eq!(outcome.status, StepStatus::Succeeded);

    let apply_task = h.gateway.last_task();
    assert_eq!(apply_task.parameters.command, TaskCommand::Apply);
    assert_eq!(apply_task.parameters.workspace.as_deref(), Some("dev"));
    assert_eq!(
        apply_task.parameters.encrypted_plan.as_ref().unwrap().encrypted_value,
        "ciphertext"
    );
    // Stores were pinned to the commits the plan fetched
    assert_eq!(apply_task.parameters.config_files.store.fetch_type, FetchType::Commit);
    assert_eq!(
        apply_task.parameters.config_files.store.commit_id.as_deref(),
        Some("c0")
    );
    assert_eq!(
        apply_task.parameters.remote_var_files[0].store.commit_id.as_deref(),
        Some("c1")
    );

    let snapshots = h.store.apply_snapshots(ENTITY).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].workspace.as_deref(), Some("dev"));
    assert_eq!(snapshots[0].var_file_configs.len(), 2);
    assert_eq!(
        h.state_files.latest_file_id(ENTITY).await.unwrap().as_deref(),
        Some("state-1")
    );

    // Destroy from plan
    h.gateway.reply(Ok(TaskResponse {
        state_file_id: Some("state-2".to_string()),
        ..response("SUCCESS", &[])
    }));
    let outcome = h
        .controller
        .execute(&h.ctx, &step(DESTROY_FROM_PLAN), TIMEOUT)
        .await;
    assert_eq!(outcome.status, StepStatus::Succeeded);
    assert_eq!(h.gateway.last_task().parameters.command, TaskCommand::Destroy);

    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
    assert_eq!(
        h.state_files.latest_file_id(ENTITY).await.unwrap().as_deref(),
        Some("state-2")
    );
    assert_eq!(h.gateway.calls(), 3);
}

#[tokio::test]
async fn test_destroy_from_apply_without_snapshot_never_dispatches() {
    let h = harness();

    let err = h
        .controller
        .obtain_task(&h.ctx, &step(DESTROY_FROM_APPLY), TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let outcome = h
        .controller
        .execute(&h.ctx, &step(DESTROY_FROM_APPLY), TIMEOUT)
        .await;
    assert_eq!(outcome.status, StepStatus::Failed);
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn test_destroy_from_apply_uses_latest_snapshot() {
    let h = harness();

    h.gateway.reply(Ok(response("SUCCESS", &[("CONFIG_FILES", "abc")])));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;
    assert_eq!(outcome.status, StepStatus::Succeeded);

    let snapshot = h.store.latest_apply_snapshot(ENTITY).await.unwrap();
    assert_eq!(snapshot.config_files.commit_id.as_deref(), Some("abc"));
    assert_eq!(snapshot.backend_config.as_deref(), Some("bucket = \"tf-state\""));

    let later = ExecutionContext::new("acc", "org", "proj", "exec-2");
    let outcome = h
        .controller
        .execute(&later, &step(DESTROY_FROM_APPLY), TIMEOUT)
        .await;
    assert_eq!(outcome.status, StepStatus::Succeeded);

    let destroy_task = h.gateway.last_task();
    assert_eq!(destroy_task.parameters.workspace.as_deref(), Some("prod"));
    assert_eq!(
        destroy_task.parameters.config_files.store.commit_id.as_deref(),
        Some("abc")
    );
    assert!(destroy_task.idempotency_key.starts_with("exec-2:acc/org/proj/network:"));
    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_cannot_inherit_from_apply() {
    let h = harness();
    let yaml = r#"
type: apply
provisioner_identifier: network
configuration_type: INHERIT_FROM_APPLY
"#;

    let err = h
        .controller
        .obtain_task(&h.ctx, &step(yaml), TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn test_apply_from_plan_without_plan_is_not_found() {
    let h = harness();

    let err = h
        .controller
        .obtain_task(&h.ctx, &step(APPLY_FROM_PLAN), TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_invalid_fetch_type_fails_before_dispatch() {
    let h = harness();
    let yaml = APPLY_INLINE.replace("fetch_type: branch", "fetch_type: tag");

    let outcome = h.controller.execute(&h.ctx, &step(&yaml), TIMEOUT).await;
    assert_eq!(outcome.status, StepStatus::Failed);
    assert!(outcome
        .failure_message
        .unwrap()
        .contains("Unrecognized git fetch type: [tag]"));
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn test_unknown_status_is_protocol_error() {
    let h = harness();

    let err = h
        .controller
        .handle_result(&h.ctx, &step(APPLY_INLINE), Ok(response("SKIPPED", &[])))
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::Protocol(_)));

    h.gateway.reply(Ok(response("SKIPPED", &[])));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;
    assert_eq!(outcome.status, StepStatus::Failed);
    assert_eq!(outcome.unit_progress.len(), 1);
    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_failure_keeps_progress_and_state() {
    let h = harness();

    h.gateway.reply(Ok(TaskResponse {
        error_message: Some("Error: provider crashed".to_string()),
        ..response("FAILURE", &[])
    }));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;

    assert_eq!(outcome.status, StepStatus::Failed);
    assert_eq!(outcome.failure_message.as_deref(), Some("Error: provider crashed"));
    assert_eq!(outcome.unit_progress[0].unit_name, "Fetch Files");
    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_error_fails_step() {
    let h = harness();

    h.gateway.reply(Err(GatewayError::Timeout(TIMEOUT)));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;

    assert_eq!(outcome.status, StepStatus::Failed);
    assert!(outcome.failure_message.unwrap().contains("timed out"));
    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_running_status_records_nothing() {
    let h = harness();

    h.gateway.reply(Ok(response("RUNNING", &[])));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;

    assert_eq!(outcome.status, StepStatus::Running);
    assert!(outcome.provisioning_outputs().is_none());
    assert!(h.store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_outputs_exposed_on_success() {
    let h = harness();

    h.gateway.reply(Ok(TaskResponse {
        outputs: Some(r#"{"vpc_id": {"value": "vpc-42", "type": "string"}}"#.to_string()),
        ..response("SUCCESS", &[])
    }));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;

    let outputs = outcome.provisioning_outputs().unwrap();
    assert_eq!(outputs["vpc_id"], serde_json::json!("vpc-42"));
    assert_eq!(outcome.outputs.keys().next().map(String::as_str), Some("terraform"));
}

#[tokio::test]
async fn test_malformed_outputs_do_not_fail_step() {
    let h = harness();

    h.gateway.reply(Ok(TaskResponse {
        outputs: Some("not json".to_string()),
        ..response("SUCCESS", &[])
    }));
    let outcome = h.controller.execute(&h.ctx, &step(APPLY_INLINE), TIMEOUT).await;

    assert_eq!(outcome.status, StepStatus::Succeeded);
    assert!(outcome.provisioning_outputs().unwrap().is_empty());
    assert_eq!(h.store.apply_snapshots(ENTITY).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_state_json_flag_captured_in_task() {
    let enabled = harness_with_flags(
        StaticFeatureFlags::new().enable(FeatureFlag::SaveTerraformStateJson, "acc"),
    );
    let task = enabled
        .controller
        .obtain_task(&enabled.ctx, &step(APPLY_INLINE), TIMEOUT)
        .await
        .unwrap();
    assert!(task.parameters.save_terraform_state_json);
    assert_eq!(task.timeout(), TIMEOUT);

    let disabled = harness();
    let task = disabled
        .controller
        .obtain_task(&disabled.ctx, &step(APPLY_INLINE), TIMEOUT)
        .await
        .unwrap();
    assert!(!task.parameters.save_terraform_state_json);
}

#[tokio::test]
async fn test_current_state_file_sent_with_task() {
    let h = harness();
    h.state_files
        .update_parent_entity(ENTITY, "state-0")
        .await
        .unwrap();

    let task = h
        .controller
        .obtain_task(&h.ctx, &step(APPLY_INLINE), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(task.parameters.current_state_file_id.as_deref(), Some("state-0"));
}

#[tokio::test]
async fn test_pipeline_stops_at_first_failed_step() {
    let store = Arc::new(MemoryStateStore::new());
    let gateway = Arc::new(ScriptedGateway::default());
    let controller = StepController::new(
        store.clone(),
        gateway.clone(),
        Arc::new(connectors()),
        Arc::new(MemoryStateFiles::new()),
        Arc::new(StaticFeatureFlags::new()),
    );
    let orchestrator = Orchestrator::new(controller, TIMEOUT);

    let pipeline = ProvisionPipeline::from_yaml(
        r#"
name: network
steps:
  - name: plan
    type: plan
    provisioner_identifier: network
    configuration:
      command: apply
      secret_manager_ref: account.vault
      config_files:
        store:
          connector_ref: git
          fetch_type: branch
          branch: main
          folder_path: network/
  - name: apply
    type: apply
    provisioner_identifier: network
    configuration_type: INHERIT_FROM_PLAN
  - name: destroy
    type: destroy
    provisioner_identifier: network
    configuration_type: INHERIT_FROM_APPLY
"#,
    )
    .unwrap();

    gateway.reply(Ok(plan_success()));
    gateway.reply(Ok(response("FAILURE", &[])));

    let run = orchestrator
        .run_pipeline(&pipeline, "acc", "org", "proj")
        .await
        .unwrap();

    assert_eq!(run.step_outcomes.len(), 2);
    assert!(matches!(run.state, RunState::Stopped { ref step, .. } if step == "apply"));
    assert!(run.completed_at.is_some());
    assert_eq!(gateway.calls(), 2);
    assert!(store.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_step_left_running_stops_pipeline_unreconciled() {
    let store = Arc::new(MemoryStateStore::new());
    let gateway = Arc::new(ScriptedGateway::default());
    let state_files = Arc::new(MemoryStateFiles::new());
    let controller = StepController::new(
        store.clone(),
        gateway.clone(),
        Arc::new(connectors()),
        state_files.clone(),
        Arc::new(StaticFeatureFlags::new()),
    );
    let orchestrator = Orchestrator::new(controller, TIMEOUT);

    let pipeline = ProvisionPipeline {
        name: "network".to_string(),
        description: String::new(),
        steps: vec![
            PipelineStep {
                name: "apply".to_string(),
                timeout_seconds: None,
                spec: step(APPLY_INLINE),
            },
            PipelineStep {
                name: "destroy".to_string(),
                timeout_seconds: None,
                spec: step(DESTROY_FROM_APPLY),
            },
        ],
    };

    gateway.reply(Ok(TaskResponse {
        state_file_id: Some("state-1".to_string()),
        ..response("QUEUED", &[])
    }));

    let run = orchestrator
        .run_pipeline(&pipeline, "acc", "org", "proj")
        .await
        .unwrap();

    match &run.state {
        RunState::Stopped { step, reason } => {
            assert_eq!(step, "apply");
            assert!(reason.contains("unreconciled"), "reason: {}", reason);
        }
        other => panic!("unexpected run state: {:?}", other),
    }
    assert_eq!(run.step_outcomes.len(), 1);
    assert_eq!(gateway.calls(), 1);
    assert!(store.apply_snapshots(ENTITY).await.unwrap().is_empty());
    assert_eq!(state_files.latest_file_id(ENTITY).await.unwrap(), None);
}

/// Controller wired the way the CLI wires it: everything under one state dir
fn file_backed_controller(dir: &Path, gateway: Arc<ScriptedGateway>) -> StepController {
    StepController::new(
        Arc::new(JsonlStateStore::open(dir).unwrap()),
        gateway,
        Arc::new(connectors()),
        Arc::new(JsonlStateFiles::open(dir).unwrap()),
        Arc::new(StaticFeatureFlags::new()),
    )
}

#[tokio::test]
async fn test_destroy_in_later_process_sends_state_file_from_apply() {
    let temp = TempDir::new().unwrap();
    let gateway = Arc::new(ScriptedGateway::default());

    {
        let first = file_backed_controller(temp.path(), gateway.clone());
        gateway.reply(Ok(TaskResponse {
            state_file_id: Some("state-1".to_string()),
            ..response("SUCCESS", &[("CONFIG_FILES", "abc")])
        }));
        let ctx = ExecutionContext::new("acc", "org", "proj", "exec-1");
        let outcome = first.execute(&ctx, &step(APPLY_INLINE), TIMEOUT).await;
        assert_eq!(outcome.status, StepStatus::Succeeded);
    }

    let second = file_backed_controller(temp.path(), gateway.clone());
    let later = ExecutionContext::new("acc", "org", "proj", "exec-2");

    let task = second
        .obtain_task(&later, &step(DESTROY_FROM_APPLY), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(task.parameters.current_state_file_id.as_deref(), Some("state-1"));
    assert_eq!(
        task.parameters.config_files.store.commit_id.as_deref(),
        Some("abc")
    );

    gateway.reply(Ok(TaskResponse {
        state_file_id: Some("state-2".to_string()),
        ..response("SUCCESS", &[])
    }));
    let outcome = second.execute(&later, &step(DESTROY_FROM_APPLY), TIMEOUT).await;
    assert_eq!(outcome.status, StepStatus::Succeeded);

    let reopened = JsonlStateFiles::open(temp.path()).unwrap();
    assert_eq!(
        reopened.latest_file_id(ENTITY).await.unwrap().as_deref(),
        Some("state-2")
    );
    let snapshots = JsonlStateStore::open(temp.path()).unwrap();
    assert!(snapshots.apply_snapshots(ENTITY).await.unwrap().is_empty());
}

//! The API boundary (§4.G): one dispatch surface, reached either through a
//! static built-in map or the Plugin Registry, every reply audited.
//!
//! Grounded on `original_source/src/kagan/core/api_plugins.py`'s
//! `invoke_plugin` mixin for the plugin half, generalized to also cover the
//! static task/workspace/execution/project/audit operations the teacher's
//! `at-bridge/src/http_api.rs` exposes as REST routes — here they are methods
//! on one dispatch table instead, since the transport is a framed socket.

use std::sync::Arc;

use kagan_api_types::{ApiError, CapabilityProfile, ErrorCode, IpcRequest, IpcResponse};
use kagan_core::store::{Store, StoreError};
use kagan_core::types::{AuditEntry, Execution, Project, Task, TaskId, TaskStatus, TaskType, Workspace};
use serde_json::{json, Value};

use crate::ipc::session_binding::SessionBinding;
use crate::plugins::PluginRegistry;
use crate::review_service::ReviewService;
use crate::runtime_service::RuntimeService;
use crate::scheduler::Scheduler;
use crate::task_service::TaskService;

/// One static operation's authorization floor and handler. `mutating` drives
/// the audit "destructiveHint" and the read-only catalog projection (§4.G).
struct StaticOperation {
    capability: &'static str,
    method: &'static str,
    minimum_profile: CapabilityProfile,
    mutating: bool,
}

macro_rules! op {
    ($cap:literal, $method:literal, $profile:expr, $mutating:expr) => {
        StaticOperation {
            capability: $cap,
            method: $method,
            minimum_profile: $profile,
            mutating: $mutating,
        }
    };
}

const STATIC_OPERATIONS: &[StaticOperation] = &[
    op!("task", "create", CapabilityProfile::Maintainer, true),
    op!("task", "list", CapabilityProfile::Viewer, false),
    op!("task", "get", CapabilityProfile::Viewer, false),
    op!("task", "set_status", CapabilityProfile::PairWorker, true),
    op!("task", "scratchpad.get", CapabilityProfile::Viewer, false),
    op!("task", "scratchpad.update", CapabilityProfile::PairWorker, true),
    op!("workspace", "list", CapabilityProfile::Viewer, false),
    op!("workspace", "get_repos", CapabilityProfile::Viewer, false),
    op!("execution", "poll", CapabilityProfile::Viewer, false),
    op!("execution", "logs", CapabilityProfile::Viewer, false),
    op!("execution", "cancel", CapabilityProfile::PairWorker, true),
    op!("execution", "review_apply", CapabilityProfile::PairWorker, true),
    op!("project", "create", CapabilityProfile::Maintainer, true),
    op!("project", "list", CapabilityProfile::Viewer, false),
    op!("audit", "list", CapabilityProfile::Maintainer, false),
    op!("runtime", "decide_startup", CapabilityProfile::Viewer, true),
    op!("runtime", "get_runtime_task", CapabilityProfile::Viewer, false),
    op!("runtime", "set_last_active_context", CapabilityProfile::PairWorker, true),
];

fn find_static_operation(capability: &str, method: &str) -> Option<&'static StaticOperation> {
    STATIC_OPERATIONS.iter().find(|op| op.capability == capability && op.method == method)
}

pub struct Dispatcher {
    store: Arc<Store>,
    scheduler: Arc<Scheduler>,
    plugins: PluginRegistry,
    scratchpad_cap_bytes: usize,
}

impl Dispatcher {
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn new(store: Arc<Store>, scheduler: Arc<Scheduler>, scratchpad_cap_bytes: usize) -> Self {
        Self {
            store,
            scheduler,
            plugins: PluginRegistry::bootstrap(),
            scratchpad_cap_bytes,
        }
    }

    /// Dispatch one request, returning the already-audited response (§4.G:
    /// "every reply is also audited"). Never returns an `Err` — transport and
    /// domain failures alike are folded into `IpcResponse::failure`.
    pub async fn dispatch(&self, request: &IpcRequest, binding: &SessionBinding) -> IpcResponse {
        let outcome = self.route(request, binding).await;
        let response = match outcome {
            Ok(result) => IpcResponse::success(request.request_id.clone(), result),
            Err(err) => IpcResponse::failure(request.request_id.clone(), err),
        };
        self.audit(request, binding, &response).await;
        response
    }

    async fn route(&self, request: &IpcRequest, binding: &SessionBinding) -> Result<Value, ApiError> {
        if let Some(op) = find_static_operation(&request.capability, &request.method) {
            if !binding.capability.satisfies(op.minimum_profile) {
                return Err(ApiError::new(
                    ErrorCode::AuthorizationDenied,
                    format!("{}.{} requires at least {:?}", op.capability, op.method, op.minimum_profile),
                ));
            }
            return self.dispatch_static(request).await;
        }

        // Not a static operation: either the generic `invoke_plugin` entrypoint
        // or a direct capability-namespace call routed straight to the
        // registry (§4.G's "notable operations" list treats both the same).
        if request.capability == "plugins" && request.method == "invoke_plugin" {
            let capability = request
                .params
                .get("capability")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::invalid_params("invoke_plugin requires params.capability"))?;
            let method = request
                .params
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::invalid_params("invoke_plugin requires params.method"))?;
            let inner_params = request.params.get("params").cloned().unwrap_or(json!({}));
            return self.plugins.dispatch(capability, method, &inner_params, binding.capability);
        }

        self.plugins
            .dispatch(&request.capability, &request.method, &request.params, binding.capability)
    }

    async fn dispatch_static(&self, request: &IpcRequest) -> Result<Value, ApiError> {
        let params = &request.params;
        match (request.capability.as_str(), request.method.as_str()) {
            ("task", "create") => self.task_create(params).await,
            ("task", "list") => self.task_list(params).await,
            ("task", "get") => self.task_get(params).await,
            ("task", "set_status") => self.task_set_status(params).await,
            ("task", "scratchpad.get") => self.task_scratchpad_get(params).await,
            ("task", "scratchpad.update") => self.task_scratchpad_update(params).await,
            ("workspace", "list") => self.workspace_list(params).await,
            ("workspace", "get_repos") => self.workspace_get_repos(params).await,
            ("execution", "poll") => self.execution_poll(params).await,
            ("execution", "logs") => self.execution_logs(params).await,
            ("execution", "cancel") => self.execution_cancel(params).await,
            ("execution", "review_apply") => self.execution_review_apply(params).await,
            ("project", "create") => self.project_create(params).await,
            ("project", "list") => self.project_list().await,
            ("audit", "list") => self.audit_list(params).await,
            ("runtime", "decide_startup") => self.runtime_decide_startup().await,
            ("runtime", "get_runtime_task") => self.runtime_get_runtime_task().await,
            ("runtime", "set_last_active_context") => self.runtime_set_last_active_context(params).await,
            _ => Err(ApiError::new(ErrorCode::UnknownMethod, format!("{}.{}", request.capability, request.method))),
        }
    }

    async fn task_create(&self, params: &Value) -> Result<Value, ApiError> {
        let project_id = parse_uuid_param(params, "project_id")?;
        let title = params
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_params("task.create requires params.title"))?;
        let task_type = match params.get("task_type").and_then(Value::as_str) {
            Some("PAIR") => TaskType::Pair,
            _ => TaskType::Auto,
        };
        let mut task = Task::new(project_id, title, task_type);
        if let Some(description) = params.get("description").and_then(Value::as_str) {
            task.description = description.to_string();
        }
        self.store.upsert_task(&task).await.map_err(store_err)?;
        Ok(ok_result(json!({ "task": task })))
    }

    async fn task_list(&self, params: &Value) -> Result<Value, ApiError> {
        let project_id = parse_uuid_param(params, "project_id")?;
        let tasks = self.store.list_tasks_by_project(project_id).await.map_err(store_err)?;
        Ok(ok_result(json!({ "tasks": tasks })))
    }

    async fn task_get(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let task = self.require_task(task_id).await?;
        Ok(ok_result(json!({ "task": task })))
    }

    async fn task_set_status(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let status: TaskStatus = serde_json::from_value(params.get("status").cloned().unwrap_or(Value::Null))
            .map_err(|_| ApiError::invalid_params("task.set_status requires a valid params.status"))?;
        let task = self.require_task(task_id).await?;
        let service = TaskService::new(&self.store, self.scratchpad_cap_bytes);
        service.set_status(&task, status).await.map_err(store_err)?;
        let reloaded = self.require_task(task_id).await?;
        Ok(ok_result(json!({ "task": reloaded })))
    }

    async fn task_scratchpad_get(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let scratchpad = self.store.get_scratchpad(task_id).await.map_err(store_err)?;
        Ok(ok_result(json!({ "scratchpad": scratchpad })))
    }

    async fn task_scratchpad_update(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let addition = params
            .get("addition")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_params("task.scratchpad.update requires params.addition"))?;
        let service = TaskService::new(&self.store, self.scratchpad_cap_bytes);
        service.append_scratchpad(task_id, addition).await.map_err(store_err)?;
        let scratchpad = self.store.get_scratchpad(task_id).await.map_err(store_err)?;
        Ok(ok_result(json!({ "scratchpad": scratchpad })))
    }

    async fn workspace_list(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let workspaces: Vec<Workspace> = self
            .store
            .list_active_workspaces_for_task(task_id)
            .await
            .map_err(store_err)?;
        Ok(ok_result(json!({ "workspaces": workspaces })))
    }

    async fn workspace_get_repos(&self, params: &Value) -> Result<Value, ApiError> {
        let workspace_id = parse_uuid_param(params, "workspace_id")?;
        let workspace = self
            .store
            .get_workspace(workspace_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ApiError::not_found(format!("workspace {workspace_id} not found")))?;
        Ok(ok_result(json!({ "repos": workspace.repos })))
    }

    async fn execution_poll(&self, params: &Value) -> Result<Value, ApiError> {
        let execution_id = parse_uuid_param(params, "execution_id")?;
        let execution = self.require_execution(execution_id).await?;
        Ok(ok_result(json!({ "execution": execution })))
    }

    async fn execution_logs(&self, params: &Value) -> Result<Value, ApiError> {
        let execution_id = parse_uuid_param(params, "execution_id")?;
        let execution = self.require_execution(execution_id).await?;
        Ok(ok_result(json!({ "log": execution.log })))
    }

    /// Request cooperative cancellation of a running execution (spec.md:180).
    /// `canceled: false` means the execution had already finished or was
    /// never registered — not an error, just a no-op.
    async fn execution_cancel(&self, params: &Value) -> Result<Value, ApiError> {
        let execution_id = parse_uuid_param(params, "execution_id")?;
        let canceled = self.scheduler.cancel_execution(execution_id);
        Ok(ok_result(json!({ "canceled": canceled })))
    }

    async fn execution_review_apply(&self, params: &Value) -> Result<Value, ApiError> {
        let task_id = parse_uuid_param(params, "task_id")?;
        let execution_id = parse_uuid_param(params, "execution_id")?;
        let approved = params
            .get("approved")
            .and_then(Value::as_bool)
            .ok_or_else(|| ApiError::invalid_params("execution.review_apply requires params.approved"))?;
        let summary = params.get("summary").and_then(Value::as_str).unwrap_or("");
        let service = ReviewService::new(&self.store, self.scratchpad_cap_bytes);
        service
            .record_review_response(task_id, execution_id, approved, summary)
            .await
            .map_err(store_err)?;
        Ok(ok_result(json!({})))
    }

    async fn project_create(&self, params: &Value) -> Result<Value, ApiError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_params("project.create requires params.name"))?;
        let project = Project::new(name);
        self.store.upsert_project(&project).await.map_err(store_err)?;
        Ok(ok_result(json!({ "project": project })))
    }

    async fn project_list(&self) -> Result<Value, ApiError> {
        let projects: Vec<Project> = self.store.list_projects().await.map_err(store_err)?;
        Ok(ok_result(json!({ "projects": projects })))
    }

    async fn audit_list(&self, params: &Value) -> Result<Value, ApiError> {
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(50) as u32;
        let entries: Vec<AuditEntry> = self.store.list_recent_audit_entries(limit).await.map_err(store_err)?;
        Ok(ok_result(json!({ "entries": entries })))
    }

    async fn runtime_decide_startup(&self) -> Result<Value, ApiError> {
        let context = RuntimeService::new(&self.store).decide_startup().await.map_err(store_err)?;
        Ok(ok_result(json!({ "context": context })))
    }

    async fn runtime_get_runtime_task(&self) -> Result<Value, ApiError> {
        let task = RuntimeService::new(&self.store).get_runtime_task().await.map_err(store_err)?;
        Ok(ok_result(json!({ "task": task })))
    }

    async fn runtime_set_last_active_context(&self, params: &Value) -> Result<Value, ApiError> {
        let label = params
            .get("label")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_params("runtime.set_last_active_context requires params.label"))?;
        let context = RuntimeService::new(&self.store)
            .set_last_active_context(label)
            .await
            .map_err(store_err)?;
        Ok(ok_result(json!({ "context": context })))
    }

    async fn require_task(&self, task_id: TaskId) -> Result<Task, ApiError> {
        self.store
            .get_task(task_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ApiError::not_found(format!("task {task_id} not found")))
    }

    async fn require_execution(&self, execution_id: uuid::Uuid) -> Result<Execution, ApiError> {
        self.store
            .get_execution(execution_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ApiError::not_found(format!("execution {execution_id} not found")))
    }

    /// Record the audit entry for one dispatched request (§4.G, §8.10): the
    /// *effective* success unwraps a nested `result.success` when present.
    async fn audit(&self, request: &IpcRequest, binding: &SessionBinding, response: &IpcResponse) {
        let entry = AuditEntry {
            request_id: request.request_id.clone(),
            session_id: binding.session_id.clone(),
            capability: format!("{:?}", binding.capability),
            method: format!("{}.{}", request.capability, request.method),
            params_digest: params_digest(&request.params),
            success: response.effective_success(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = self.store.record_audit_entry(&entry).await {
            tracing::warn!(error = %err, "failed to record audit entry");
        }
    }
}

/// Every static operation's result is a dict carrying `success: bool` (§4.G).
fn ok_result(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.entry("success").or_insert(Value::Bool(true));
    }
    value
}

fn parse_uuid_param(params: &Value, key: &str) -> Result<uuid::Uuid, ApiError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::invalid_params(format!("missing or invalid params.{key}")))
}

/// A digest, not the raw params, so the audit log never grows unboundedly
/// sensitive (`kagan_core::store::audit`'s doc comment).
fn params_digest(params: &Value) -> String {
    let encoded = serde_json::to_vec(params).unwrap_or_default();
    blake3::hash(&encoded).to_hex().to_string()
}

fn store_err(err: StoreError) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::CoreConfig;

    async fn seeded() -> (Arc<Store>, Dispatcher, SessionBinding) {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let config = CoreConfig::default();
        let worktrees = Arc::new(kagan_core::worktree_manager::WorktreeManager::with_default_runner(
            std::env::temp_dir().join("kagan-dispatch-test"),
        ));
        let scheduler = Arc::new(Scheduler::new(store.clone(), worktrees, config.clone()));
        let dispatcher = Dispatcher::new(store.clone(), scheduler, config.scratchpad_cap_bytes);
        let binding = SessionBinding::new("sess-1", CapabilityProfile::Maintainer, "user-1");
        (store, dispatcher, binding)
    }

    fn request(capability: &str, method: &str, params: Value) -> IpcRequest {
        IpcRequest {
            request_id: "r1".to_string(),
            session_id: "sess-1".to_string(),
            capability: capability.to_string(),
            method: method.to_string(),
            params,
            token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn task_lifecycle_round_trips_through_dispatch() {
        let (_store, dispatcher, binding) = seeded().await;

        let create_project = dispatcher
            .dispatch(&request("project", "create", json!({ "name": "proj" })), &binding)
            .await;
        assert!(create_project.ok);
        let IpcResponseBodyHelper::Ok(project_result) = classify(create_project.body) else {
            panic!("expected ok")
        };
        let project_id = project_result["project"]["id"].as_str().unwrap().to_string();

        let create_task = dispatcher
            .dispatch(
                &request("task", "create", json!({ "project_id": project_id, "title": "t1" })),
                &binding,
            )
            .await;
        assert!(create_task.ok);
        let IpcResponseBodyHelper::Ok(task_result) = classify(create_task.body) else {
            panic!("expected ok")
        };
        let task_id = task_result["task"]["id"].as_str().unwrap().to_string();

        let scratchpad_update = dispatcher
            .dispatch(
                &request("task", "scratchpad.update", json!({ "task_id": task_id, "addition": "progress" })),
                &binding,
            )
            .await;
        assert!(scratchpad_update.ok);

        let list = dispatcher
            .dispatch(&request("task", "list", json!({ "project_id": project_id })), &binding)
            .await;
        assert!(list.ok);
    }

    #[tokio::test]
    async fn viewer_cannot_create_task() {
        let (_store, dispatcher, _binding) = seeded().await;
        let viewer = SessionBinding::new("sess-2", CapabilityProfile::Viewer, "viewer-1");
        let response = dispatcher
            .dispatch(
                &request("task", "create", json!({ "project_id": uuid::Uuid::new_v4(), "title": "t" })),
                &viewer,
            )
            .await;
        assert!(!response.ok);
        let IpcResponseBodyHelper::Err(err) = classify(response.body) else {
            panic!("expected error")
        };
        assert_eq!(err.code, ErrorCode::AuthorizationDenied);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let (_store, dispatcher, binding) = seeded().await;
        let response = dispatcher.dispatch(&request("task", "obliterate", json!({})), &binding).await;
        assert!(!response.ok);
    }

    #[tokio::test]
    async fn execution_cancel_reports_false_for_an_unregistered_execution() {
        let (_store, dispatcher, binding) = seeded().await;
        let response = dispatcher
            .dispatch(&request("execution", "cancel", json!({ "execution_id": uuid::Uuid::new_v4() })), &binding)
            .await;
        assert!(response.ok);
        let IpcResponseBodyHelper::Ok(result) = classify(response.body) else {
            panic!("expected ok")
        };
        assert_eq!(result["canceled"], json!(false));
    }

    #[tokio::test]
    async fn execution_review_apply_records_the_decision() {
        let (store, dispatcher, binding) = seeded().await;
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let task = Task::new(project.id, "t", TaskType::Auto);
        store.upsert_task(&task).await.unwrap();
        let workspace = Workspace::new(task.id, Vec::new());
        store.insert_workspace(&workspace).await.unwrap();
        let execution = Execution::new(task.id, workspace.id, 1);
        store.insert_execution(&execution).await.unwrap();

        let response = dispatcher
            .dispatch(
                &request(
                    "execution",
                    "review_apply",
                    json!({ "task_id": task.id, "execution_id": execution.id, "approved": true, "summary": "lgtm" }),
                ),
                &binding,
            )
            .await;
        assert!(response.ok);

        let reloaded = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(reloaded.metadata["review_result"]["approved"], json!(true));
    }

    #[tokio::test]
    async fn runtime_decide_startup_returns_the_current_context() {
        let (_store, dispatcher, binding) = seeded().await;
        let response = dispatcher.dispatch(&request("runtime", "decide_startup", json!({})), &binding).await;
        assert!(response.ok);
    }

    #[tokio::test]
    async fn runtime_set_last_active_context_round_trips() {
        let (_store, dispatcher, binding) = seeded().await;
        let response = dispatcher
            .dispatch(&request("runtime", "set_last_active_context", json!({ "label": "frontend" })), &binding)
            .await;
        assert!(response.ok);
        let IpcResponseBodyHelper::Ok(result) = classify(response.body) else {
            panic!("expected ok")
        };
        assert_eq!(result["context"]["last_active_context"], json!("frontend"));
    }

    #[tokio::test]
    async fn plugin_noop_ping_dispatches_through_registry() {
        let (_store, dispatcher, binding) = seeded().await;
        let response = dispatcher
            .dispatch(&request("plugins", "noop_ping", json!({ "echo": "hi" })), &binding)
            .await;
        assert!(response.ok);
    }

    enum IpcResponseBodyHelper {
        Ok(Value),
        Err(ApiError),
    }

    fn classify(body: kagan_api_types::IpcResponseBody) -> IpcResponseBodyHelper {
        match body {
            kagan_api_types::IpcResponseBody::Ok { result } => IpcResponseBodyHelper::Ok(result),
            kagan_api_types::IpcResponseBody::Err { error } => IpcResponseBodyHelper::Err(error),
        }
    }
}

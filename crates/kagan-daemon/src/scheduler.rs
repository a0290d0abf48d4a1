//! AUTO run-loop and review loop (§4.D).
//!
//! Grounded on `at-daemon/src/scheduler.rs`'s `next_bead`/`assign_bead`
//! shape, generalized from a single next-pick-and-assign model to one turn
//! per `IN_PROGRESS`/`AUTO` task running concurrently under a semaphore; the
//! background polling cadence (first tick consumed before the loop starts,
//! `tokio::select!` racing the interval against shutdown) is grounded on
//! `at-daemon/src/daemon.rs`'s `run_loops`.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{error, info, warn};

use kagan_agents::signals::{parse_review_decision, parse_signal, ReviewDecision, Signal};
use kagan_agents::{AgentSession, ExitOutcome};
use kagan_api_types::AgentPermissionScope;
use kagan_core::config::CoreConfig;
use kagan_core::store::{Store, StoreError};
use kagan_core::conflict_instructions::build_conflict_resolution_instructions;
use kagan_core::types::{Execution, ExecutionId, ExecutionStatus, Task, TaskId, TaskStatus, TaskType, Workspace};
use kagan_core::worktree_manager::{RebaseOutcome, WorktreeError, WorktreeManager};

use crate::review_service::ReviewService;
use crate::task_service::TaskService;

/// Default argv used when a task carries no explicit `agent_backend`.
const DEFAULT_AGENT_BACKEND: &str = "kagan-agent";

/// Cooperative-cancellation handle for a running execution, keyed by
/// execution id so `execution.cancel` (spec.md:180) can reach an
/// `AgentSession` that lives inside a spawned tick task.
#[derive(Clone)]
struct CancelHandle(Arc<Notify>);

impl CancelHandle {
    fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    fn trigger(&self) {
        self.0.notify_one();
    }
}

pub struct Scheduler {
    store: Arc<Store>,
    worktrees: Arc<WorktreeManager>,
    config: CoreConfig,
    auto_pool: Arc<Semaphore>,
    task_locks: DashMap<TaskId, Arc<Mutex<()>>>,
    running: DashMap<ExecutionId, CancelHandle>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, worktrees: Arc<WorktreeManager>, config: CoreConfig) -> Self {
        let auto_pool = Arc::new(Semaphore::new(config.max_concurrent_agents));
        Self {
            store,
            worktrees,
            config,
            auto_pool,
            task_locks: DashMap::new(),
            running: DashMap::new(),
        }
    }

    fn lock_for(&self, task_id: TaskId) -> Arc<Mutex<()>> {
        self.task_locks.entry(task_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Request cancellation of a running execution (`execution.cancel`).
    /// Returns `false` when the execution is not currently running a session
    /// (already finished, or never started).
    pub fn cancel_execution(&self, id: ExecutionId) -> bool {
        match self.running.get(&id) {
            Some(handle) => {
                handle.trigger();
                true
            }
            None => false,
        }
    }

    /// Poll the backlog on a fixed cadence until `shutdown` fires. The first
    /// tick is consumed immediately so the loop doesn't double-fire at
    /// startup, mirroring `at-daemon/src/daemon.rs`'s `run_loops`.
    pub async fn run_loops(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut poll = tokio::time::interval(std::time::Duration::from_secs(2));
        poll.tick().await;
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("scheduler loop received shutdown signal");
                    break;
                }
            }
        }
    }

    /// One scheduling pass: find every `IN_PROGRESS`/`AUTO` task and drive a
    /// turn for each, bounded by `max_concurrent_agents`. Tasks whose
    /// per-task mutex is already held (a turn still in flight) are skipped
    /// this tick rather than queued, since the next tick will pick them up.
    pub async fn tick(self: &Arc<Self>) {
        let candidates = match self.store.list_tasks_by_status(TaskStatus::InProgress).await {
            Ok(tasks) => tasks.into_iter().filter(|t| t.task_type == TaskType::Auto).collect::<Vec<_>>(),
            Err(err) => {
                error!(error = %err, "failed to list in-progress tasks");
                return;
            }
        };

        for task in candidates {
            let lock = self.lock_for(task.id);
            let Ok(guard) = lock.try_lock_owned() else {
                continue;
            };
            let Ok(permit) = self.auto_pool.clone().try_acquire_owned() else {
                continue;
            };
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let _guard = guard;
                let _permit = permit;
                if let Err(err) = this.run_task_turn(&task).await {
                    error!(task_id = %task.id, error = %err, "scheduler turn failed");
                }
            });
        }
    }

    async fn ensure_workspace(&self, task: &Task) -> Result<Workspace, StoreError> {
        let active = self.store.list_active_workspaces_for_task(task.id).await?;
        if let Some(existing) = active.into_iter().next() {
            return Ok(existing);
        }
        let repos = self.store.list_repos_by_project(task.project_id).await?;
        let workspace = self
            .worktrees
            .create_workspace(task, &repos, task.base_branch.as_deref(), &HashSet::new())
            .await
            .map_err(worktree_err_to_store_err)?;
        self.store.insert_workspace(&workspace).await?;
        Ok(workspace)
    }

    fn build_run_prompt(task: &Task, run_index: u32, scratchpad_tail: &str) -> String {
        let criteria = if task.acceptance_criteria.is_empty() {
            "(none specified)".to_string()
        } else {
            task.acceptance_criteria.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n")
        };
        format!(
            "# {title}\n\nRun #{run_index}\n\n{description}\n\n## Acceptance criteria\n\n{criteria}\n\n## Previous progress\n\n{scratchpad}\n",
            title = task.title,
            description = task.description,
            scratchpad = if scratchpad_tail.is_empty() { "(none yet)" } else { scratchpad_tail },
        )
    }

    fn agent_command(task: &Task) -> Vec<String> {
        match &task.agent_backend {
            Some(backend) if !backend.is_empty() => backend.split_whitespace().map(str::to_string).collect(),
            _ => vec![DEFAULT_AGENT_BACKEND.to_string()],
        }
    }

    /// Run a single AUTO turn end to end: ensure workspace, spawn a session,
    /// drive it to completion, act on the signal (§4.D steps 1-6).
    async fn run_task_turn(&self, task: &Task) -> Result<(), StoreError> {
        let run_index = self.store.next_run_index(task.id).await?;
        if run_index > self.config.max_runs_per_task {
            let tasks = TaskService::new(&self.store, self.config.scratchpad_cap_bytes);
            tasks.set_status(task, TaskStatus::Review).await?;
            return Ok(());
        }

        let workspace = self.ensure_workspace(task).await?;
        let scratchpad = self.store.get_scratchpad(task.id).await?;

        let execution = Execution::new(task.id, workspace.id, run_index);
        self.store.insert_execution(&execution).await?;

        let workdir = workspace
            .repos
            .first()
            .map(|r| std::path::PathBuf::from(&r.worktree_path))
            .unwrap_or_else(std::env::temp_dir);

        let conflict_prompt = self.rebase_conflict_prompt(&workspace, &execution.id).await?;

        let command = Self::agent_command(task);
        let mut session = match AgentSession::spawn(
            &command,
            &workdir,
            AgentPermissionScope::AutomationRunner,
            &task.id.to_string(),
            false,
            self.config.planner_auto_approve,
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "failed to spawn agent session");
                self.store.set_execution_status(execution.id, ExecutionStatus::Failed, None).await?;
                return Ok(());
            }
        };

        self.store.set_execution_status(execution.id, ExecutionStatus::Running, None).await?;
        let prompt = conflict_prompt.unwrap_or_else(|| Self::build_run_prompt(task, run_index, &scratchpad));
        session.send_prompt(prompt).await.ok();

        let cancel = CancelHandle::new();
        self.running.insert(execution.id, cancel.clone());
        let outcome = self.drive_session(&mut session, &execution.id, &cancel.0).await;
        self.running.remove(&execution.id);

        match outcome {
            SessionOutcome::Completed => {
                let signal = parse_signal(&session.buffers().response_text());
                self.handle_signal(task, &execution, signal.signal, &signal.reason, run_index).await?;
            }
            SessionOutcome::Canceled { exit } => {
                self.store
                    .set_execution_status(execution.id, ExecutionStatus::Canceled, exit.exit_code)
                    .await?;
            }
            SessionOutcome::Failed { exit } => {
                self.store
                    .set_execution_status(execution.id, ExecutionStatus::Failed, exit.exit_code)
                    .await?;
                if exit.is_failure() {
                    warn!(task_id = %task.id, exit_code = ?exit.exit_code, "agent session exited abnormally");
                }
            }
        }
        Ok(())
    }

    /// Drive a session to completion, racing each ACP frame read against
    /// `cancel` so `execution.cancel` (spec.md:180) can interrupt mid-turn.
    /// Headless automation sessions carry no message target, so any
    /// `RequestPermission` they raise is resolved by `should_auto_approve`
    /// through the same registration/answer/wait path a UI-backed session
    /// would use, rather than answered inline (§4.C.3).
    async fn drive_session(&self, session: &mut AgentSession, execution_id: &ExecutionId, cancel: &Notify) -> SessionOutcome {
        use kagan_agents::protocol::SessionUpdate;

        loop {
            tokio::select! {
                update = session.next_update() => {
                    match update {
                        Ok(Some(update)) => {
                            if let Ok(text) = serde_json::to_string(&update) {
                                self.store.append_execution_log(*execution_id, text).await.ok();
                            }
                            match update {
                                SessionUpdate::Complete | SessionUpdate::Fail { .. } => {
                                    session.terminate().await;
                                    return SessionOutcome::Completed;
                                }
                                SessionUpdate::RequestPermission { id, .. } => {
                                    let approved = session.should_auto_approve(false);
                                    let (pending_id, rx) = session.await_permission_answer().await;
                                    session.answer_permission(pending_id, approved);
                                    let granted = AgentSession::wait_for_permission(rx, session.permission_wait_timeout()).await;
                                    session.respond_permission(id, granted).await.ok();
                                }
                                _ => {}
                            }
                        }
                        Ok(None) => {
                            let exit = session.terminate().await;
                            return SessionOutcome::Failed { exit };
                        }
                        Err(err) => {
                            warn!(error = %err, "error reading agent session output");
                            let exit = session.terminate().await;
                            return SessionOutcome::Failed { exit };
                        }
                    }
                }
                _ = cancel.notified() => {
                    session.cancel().await.ok();
                    let exit = session.terminate().await;
                    return SessionOutcome::Canceled { exit };
                }
            }
        }
    }

    async fn handle_signal(
        &self,
        task: &Task,
        execution: &Execution,
        signal: Signal,
        reason: &str,
        run_index: u32,
    ) -> Result<(), StoreError> {
        let tasks = TaskService::new(&self.store, self.config.scratchpad_cap_bytes);
        match signal {
            Signal::Blocked => {
                self.store.set_execution_status(execution.id, ExecutionStatus::Failed, None).await?;
                self.store.append_execution_log(execution.id, format!("blocked: {reason}")).await?;
            }
            Signal::Complete => {
                self.store.set_execution_status(execution.id, ExecutionStatus::Succeeded, Some(0)).await?;
                self.start_review(task, execution.id).await?;
            }
            Signal::Continue => {
                self.store.set_execution_status(execution.id, ExecutionStatus::Succeeded, Some(0)).await?;
                if run_index >= self.config.max_runs_per_task {
                    tasks.set_status(task, TaskStatus::Review).await?;
                }
            }
        }
        Ok(())
    }

    async fn start_review(&self, task: &Task, execution_id: ExecutionId) -> Result<(), StoreError> {
        let review = ReviewService::new(&self.store, self.config.scratchpad_cap_bytes);
        review.start_review(task.id, execution_id).await?;

        if !self.config.auto_review_enabled {
            return Ok(());
        }

        let Some(workspace) = self.store.list_active_workspaces_for_task(task.id).await?.into_iter().next() else {
            return Ok(());
        };
        let workdir = workspace
            .repos
            .first()
            .map(|r| std::path::PathBuf::from(&r.worktree_path))
            .unwrap_or_else(std::env::temp_dir);

        let command = Self::agent_command(task);
        let mut session = match AgentSession::spawn(
            &command,
            &workdir,
            AgentPermissionScope::AutomationReviewer,
            &task.id.to_string(),
            true,
            self.config.planner_auto_approve,
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "failed to spawn review session");
                return Ok(());
            }
        };

        let diff = self.diff_for_review(task, &workspace).await.unwrap_or_default();
        let diff = truncate_diff(&diff, self.config.review_diff_cap_bytes);
        let prompt = format!(
            "# Review: {title}\n\n## Diff\n\n{diff}\n",
            title = task.title,
        );
        session.send_prompt(prompt).await.ok();
        let cancel = CancelHandle::new();
        self.running.insert(execution_id, cancel.clone());
        let outcome = self.drive_session(&mut session, &execution_id, &cancel.0).await;
        self.running.remove(&execution_id);
        if let SessionOutcome::Canceled { .. } = outcome {
            self.store.set_execution_status(execution_id, ExecutionStatus::Canceled, None).await?;
        }
        if !matches!(outcome, SessionOutcome::Completed) {
            return Ok(());
        }

        let decision = parse_review_decision(&session.buffers().response_text());
        let review = ReviewService::new(&self.store, self.config.scratchpad_cap_bytes);
        match decision {
            Some(ReviewDecision::Approved) => {
                let tasks = TaskService::new(&self.store, self.config.scratchpad_cap_bytes);
                tasks.set_status(task, TaskStatus::Done).await?;
                review.record_review_response(task.id, execution_id, true, "").await?;
            }
            Some(ReviewDecision::Rejected) => {
                let tasks = TaskService::new(&self.store, self.config.scratchpad_cap_bytes);
                tasks.set_status(task, TaskStatus::InProgress).await?;
                review
                    .record_review_response(task.id, execution_id, false, &session.buffers().response_text())
                    .await?;
            }
            None => {
                info!(task_id = %task.id, "review run produced no decision; leaving task in REVIEW");
            }
        }
        Ok(())
    }

    /// Rebase each repo in `workspace` onto its target branch before the turn
    /// starts; a conflict short-circuits the normal run prompt with
    /// conflict-resolution instructions for the agent (§4.B).
    async fn rebase_conflict_prompt(&self, workspace: &Workspace, execution_id: &ExecutionId) -> Result<Option<String>, StoreError> {
        for entry in &workspace.repos {
            let worktree_path = std::path::Path::new(&entry.worktree_path);
            let outcome = self
                .worktrees
                .rebase_onto_target(worktree_path, &entry.target_branch)
                .await;
            match outcome {
                Ok(RebaseOutcome::Conflict(files)) => {
                    let instructions = build_conflict_resolution_instructions(
                        &entry.branch_name,
                        &entry.target_branch,
                        &files,
                        None,
                    );
                    self.store
                        .append_execution_log(*execution_id, format!("rebase conflict before turn: {} file(s)", files.len()))
                        .await?;
                    return Ok(Some(instructions));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "failed to rebase workspace onto target branch before turn");
                }
            }
        }
        Ok(None)
    }

    async fn diff_for_review(&self, task: &Task, workspace: &Workspace) -> Option<String> {
        let repos = self.store.list_repos_by_project(task.project_id).await.ok()?;
        match self.worktrees.diff_against_target(workspace, &repos).await {
            Ok(diff) => Some(diff),
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "failed to compute review diff");
                None
            }
        }
    }
}

fn worktree_err_to_store_err(err: WorktreeError) -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}

fn truncate_diff(diff: &str, cap: usize) -> String {
    if diff.len() <= cap {
        diff.to_string()
    } else {
        format!("{}\n... (diff truncated)", &diff[..cap])
    }
}

enum SessionOutcome {
    Completed,
    Canceled { exit: ExitOutcome },
    Failed { exit: ExitOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::types::{Project, TaskPriority};

    #[test]
    fn agent_command_falls_back_to_default_backend() {
        let mut task = Task::new(uuid::Uuid::new_v4(), "t", TaskType::Auto);
        task.agent_backend = None;
        assert_eq!(Scheduler::agent_command(&task), vec![DEFAULT_AGENT_BACKEND.to_string()]);

        task.agent_backend = Some("claude --print".to_string());
        assert_eq!(Scheduler::agent_command(&task), vec!["claude".to_string(), "--print".to_string()]);
    }

    #[test]
    fn build_run_prompt_includes_scratchpad_tail_and_run_index() {
        let mut task = Task::new(uuid::Uuid::new_v4(), "Fix the bug", TaskType::Auto);
        task.priority = TaskPriority::High;
        let prompt = Scheduler::build_run_prompt(&task, 3, "earlier notes");
        assert!(prompt.contains("Run #3"));
        assert!(prompt.contains("earlier notes"));
    }

    #[test]
    fn truncate_diff_appends_marker_when_oversized() {
        let diff = "a".repeat(100);
        let truncated = truncate_diff(&diff, 10);
        assert_eq!(truncated.len(), 10 + "\n... (diff truncated)".len());
        assert!(truncated.ends_with("(diff truncated)"));
    }

    #[tokio::test]
    async fn run_to_max_runs_pushes_task_to_review() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let mut task = Task::new(project.id, "t", TaskType::Auto);
        task.status = TaskStatus::InProgress;
        store.upsert_task(&task).await.unwrap();

        let mut config = CoreConfig::default();
        config.max_runs_per_task = 0;
        let worktrees = Arc::new(WorktreeManager::with_default_runner(std::env::temp_dir()));
        let scheduler = Scheduler::new(store.clone(), worktrees, config);
        scheduler.run_task_turn(&task).await.unwrap();

        let reloaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Review);
    }
}

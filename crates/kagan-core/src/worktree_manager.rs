//! Worktree Manager (§4.B): materializes per-task working directories and
//! releases them. Grounded heavily on `at-core/src/worktree_manager.rs` —
//! the `GitRunner` trait and its mock-based test doubles carry over almost
//! directly; branch/target resolution is generalized from the teacher's
//! single-repo Bead model to this spec's per-Repo Workspace model.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lockfile::{self, LeaseError, RepoLockResult};
use crate::types::{Repo, Task, Workspace, WorkspaceRepoEntry};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("no target branch known for repo {repo}: provide one explicitly, set task.base_branch, or repo.default_branch")]
    NoTargetBranch { repo: String },
    #[error("git command failed: {0}")]
    GitFailed(String),
    #[error("repo {repo} is locked by pid {pid} on this host — another workspace is active for it")]
    RepoLocked { repo: String, pid: u32 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("lockfile error: {0}")]
    Lease(#[from] LeaseError),
}

pub struct GitOutput {
    pub status_ok: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over the `git` binary so the manager is testable without a
/// real repository. Mirrors the teacher's `GitRunner` trait one-for-one.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput, WorktreeError>;
}

pub struct RealGitRunner;

#[async_trait]
impl GitRunner for RealGitRunner {
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput, WorktreeError> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| WorktreeError::GitFailed(e.to_string()))?;
        Ok(GitOutput {
            status_ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MergeResult {
    Success,
    Conflict(Vec<String>),
    NothingToMerge,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RebaseOutcome {
    UpToDate,
    Rebased,
    Conflict(Vec<String>),
}

pub struct WorktreeManager {
    base_dir: PathBuf,
    git: Arc<dyn GitRunner>,
}

impl WorktreeManager {
    pub fn new(base_dir: impl Into<PathBuf>, git: Arc<dyn GitRunner>) -> Self {
        Self {
            base_dir: base_dir.into(),
            git,
        }
    }

    pub fn with_default_runner(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, Arc::new(RealGitRunner))
    }

    /// Resolve `target_branch` with priority explicit > task.base_branch >
    /// repo.default_branch (§4.B.2).
    fn resolve_target_branch<'a>(
        explicit: Option<&'a str>,
        task: &'a Task,
        repo: &'a Repo,
    ) -> Result<&'a str, WorktreeError> {
        explicit
            .or(task.base_branch.as_deref())
            .or(repo.default_branch.as_deref())
            .ok_or_else(|| WorktreeError::NoTargetBranch {
                repo: repo.display_name.clone(),
            })
    }

    fn leaf_path(&self, task: &Task, repo: &Repo, slug: &str) -> PathBuf {
        self.base_dir
            .join(task.project_id.to_string())
            .join(sanitize_name(&repo.display_name))
            .join(task.id.to_string())
            .join(slug)
    }

    /// Create (or reuse, if already ACTIVE) a workspace spanning `repos`.
    pub async fn create_workspace(
        &self,
        task: &Task,
        repos: &[Repo],
        explicit_target_branch: Option<&str>,
        taken_slugs: &HashSet<String>,
    ) -> Result<Workspace, WorktreeError> {
        let slug = unique_slug(&task.title, task.id, taken_slugs);
        let branch_name = slug.clone();

        let mut entries = Vec::with_capacity(repos.len());
        let mut locked: Vec<&Repo> = Vec::with_capacity(repos.len());
        for repo in repos {
            if let Err(err) = self
                .create_one_repo_workspace(task, repo, &slug, &branch_name, explicit_target_branch, &mut entries)
                .await
            {
                for held in &locked {
                    lockfile::release_repo_lock(Path::new(&held.path));
                }
                return Err(err);
            }
            locked.push(repo);
        }

        info!(task_id = %task.id, slug = %slug, repos = entries.len(), "workspace created");
        Ok(Workspace::new(task.id, entries))
    }

    async fn create_one_repo_workspace(
        &self,
        task: &Task,
        repo: &Repo,
        slug: &str,
        branch_name: &str,
        explicit_target_branch: Option<&str>,
        entries: &mut Vec<WorkspaceRepoEntry>,
    ) -> Result<(), WorktreeError> {
        match lockfile::acquire_repo_lock(Path::new(&repo.path))? {
            RepoLockResult::Acquired => {}
            RepoLockResult::HeldByLivePeer(holder) => {
                return Err(WorktreeError::RepoLocked {
                    repo: repo.display_name.clone(),
                    pid: holder.pid,
                });
            }
        }

        if let Err(err) = self
            .add_one_repo_worktree(task, repo, slug, branch_name, explicit_target_branch, entries)
            .await
        {
            lockfile::release_repo_lock(Path::new(&repo.path));
            return Err(err);
        }
        Ok(())
    }

    async fn add_one_repo_worktree(
        &self,
        task: &Task,
        repo: &Repo,
        slug: &str,
        branch_name: &str,
        explicit_target_branch: Option<&str>,
        entries: &mut Vec<WorkspaceRepoEntry>,
    ) -> Result<(), WorktreeError> {
        let target_branch = Self::resolve_target_branch(explicit_target_branch, task, repo)?.to_string();
        let worktree_path = self.leaf_path(task, repo, slug);

        self.bootstrap_if_empty(repo, &target_branch).await?;
        self.add_worktree(repo, &worktree_path, branch_name, &target_branch).await?;
        self.write_session_descriptor(&worktree_path, task, &target_branch)?;

        entries.push(WorkspaceRepoEntry {
            repo_id: repo.id,
            worktree_path: worktree_path.display().to_string(),
            branch_name: branch_name.to_string(),
            target_branch,
        });
        Ok(())
    }

    /// `git diff <target_branch>...HEAD` inside one repo's worktree, used by
    /// the review turn to attach the change set to the review prompt (§4.D.7).
    /// Concatenates every repo entry's diff, headed by its `display_name`.
    pub async fn diff_against_target(&self, workspace: &Workspace, repos: &[Repo]) -> Result<String, WorktreeError> {
        let mut combined = String::new();
        for entry in &workspace.repos {
            let repo = repos.iter().find(|r| r.id == entry.repo_id);
            let worktree_path = Path::new(&entry.worktree_path);
            let result = self
                .git
                .run(worktree_path, &["diff", &format!("{}...HEAD", entry.target_branch)])
                .await?;
            if !result.status_ok {
                return Err(WorktreeError::GitFailed(result.stderr));
            }
            if result.stdout.is_empty() {
                continue;
            }
            let label = repo.map(|r| r.display_name.as_str()).unwrap_or(&entry.worktree_path);
            combined.push_str(&format!("--- {label} ---\n{}\n", result.stdout));
        }
        Ok(combined)
    }

    async fn add_worktree(
        &self,
        repo: &Repo,
        worktree_path: &Path,
        branch_name: &str,
        target_branch: &str,
    ) -> Result<(), WorktreeError> {
        if let Some(parent) = worktree_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path_str = worktree_path.display().to_string();
        let result = self
            .git
            .run(
                Path::new(&repo.path),
                &["worktree", "add", "-b", branch_name, &path_str, target_branch],
            )
            .await?;
        if !result.status_ok {
            return Err(WorktreeError::GitFailed(result.stderr));
        }
        Ok(())
    }

    /// Bootstrap an empty repo with an initial commit so a base branch
    /// always exists (§4.B.5). `.gitignore` is force-added so a global
    /// `core.excludesfile` cannot suppress the bootstrap commit.
    async fn bootstrap_if_empty(&self, repo: &Repo, _target_branch: &str) -> Result<(), WorktreeError> {
        let head_check = self
            .git
            .run(Path::new(&repo.path), &["rev-parse", "--verify", "HEAD"])
            .await?;
        if head_check.status_ok {
            return Ok(());
        }

        debug!(repo = %repo.display_name, "bootstrapping empty repo with initial commit");
        let gitignore = Path::new(&repo.path).join(".gitignore");
        if !gitignore.exists() {
            tokio::fs::write(&gitignore, "").await?;
        }
        self.git
            .run(Path::new(&repo.path), &["add", "-f", ".gitignore"])
            .await?;
        let commit = self
            .git
            .run(
                Path::new(&repo.path),
                &["commit", "--allow-empty", "-m", "chore: bootstrap repository"],
            )
            .await?;
        if !commit.status_ok {
            return Err(WorktreeError::GitFailed(commit.stderr));
        }
        Ok(())
    }

    fn write_session_descriptor(
        &self,
        worktree_path: &Path,
        task: &Task,
        target_branch: &str,
    ) -> Result<(), WorktreeError> {
        let kagan_dir = worktree_path.join(".kagan");
        std::fs::create_dir_all(&kagan_dir)?;

        let descriptor = serde_json::json!({
            "task_id": task.id,
            "title": task.title,
            "target_branch": target_branch,
            "task_type": task.task_type,
        });
        std::fs::write(
            kagan_dir.join("session.json"),
            serde_json::to_vec_pretty(&descriptor)?,
        )?;

        let prompt = format!(
            "# {title}\n\n{description}\n\n## Acceptance criteria\n\n{criteria}\n",
            title = task.title,
            description = task.description,
            criteria = if task.acceptance_criteria.is_empty() {
                "(none specified)".to_string()
            } else {
                task.acceptance_criteria
                    .iter()
                    .map(|c| format!("- {c}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        );
        std::fs::write(worktree_path.join("start_prompt.md"), prompt)?;
        Ok(())
    }

    /// Release a workspace: the caller flips the Workspace row to ARCHIVED
    /// first; this only tears down the on-disk worktrees (§4.B release).
    pub async fn release_workspace(&self, workspace: &Workspace, repos: &[Repo]) -> Result<(), WorktreeError> {
        for entry in &workspace.repos {
            let Some(repo) = repos.iter().find(|r| r.id == entry.repo_id) else {
                continue;
            };
            let result = self
                .git
                .run(
                    Path::new(&repo.path),
                    &["worktree", "remove", "--force", &entry.worktree_path],
                )
                .await?;
            if !result.status_ok {
                warn!(
                    path = %entry.worktree_path,
                    stderr = %result.stderr,
                    "worktree remove failed (tolerated: may already be gone)"
                );
            }
            lockfile::release_repo_lock(Path::new(&repo.path));
        }
        Ok(())
    }

    /// Merge `branch_name` into `main_branch` in the repo's primary checkout
    /// (not a worktree — `git merge` operates on the branch checked out in
    /// `repo.path` itself). Conflicted files are reported for the §4.B
    /// conflict helper to turn into agent instructions; a conflicted merge is
    /// aborted so the repo is left clean for the next attempt.
    pub async fn merge_to_main(
        &self,
        repo: &Repo,
        branch_name: &str,
        main_branch: &str,
    ) -> Result<MergeResult, WorktreeError> {
        let checkout = self.git.run(Path::new(&repo.path), &["checkout", main_branch]).await?;
        if !checkout.status_ok {
            return Err(WorktreeError::GitFailed(checkout.stderr));
        }

        let merge = self.git.run(Path::new(&repo.path), &["merge", "--no-ff", branch_name]).await?;

        if merge.status_ok {
            if merge.stdout.contains("Already up to date") {
                return Ok(MergeResult::NothingToMerge);
            }
            return Ok(MergeResult::Success);
        }

        let status = self
            .git
            .run(Path::new(&repo.path), &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let conflicted: Vec<String> = status
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        self.git.run(Path::new(&repo.path), &["merge", "--abort"]).await.ok();
        Ok(MergeResult::Conflict(conflicted))
    }

    /// Rebase a worktree's branch onto `target_branch` before a turn starts,
    /// so the agent works against the latest target instead of discovering
    /// drift only at merge time (§4.B). A conflicted rebase is aborted,
    /// leaving the worktree exactly as it was; the caller turns the
    /// conflicted file list into agent instructions via
    /// `conflict_instructions::build_conflict_resolution_instructions`.
    pub async fn rebase_onto_target(&self, worktree_path: &Path, target_branch: &str) -> Result<RebaseOutcome, WorktreeError> {
        let rebase = self.git.run(worktree_path, &["rebase", target_branch]).await?;
        if rebase.status_ok {
            if rebase.stdout.contains("up to date") {
                return Ok(RebaseOutcome::UpToDate);
            }
            return Ok(RebaseOutcome::Rebased);
        }

        let status = self
            .git
            .run(worktree_path, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let conflicted: Vec<String> = status
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        self.git.run(worktree_path, &["rebase", "--abort"]).await.ok();
        Ok(RebaseOutcome::Conflict(conflicted))
    }

    /// Remove worktrees older than `max_age` whose workspace is archived;
    /// callers supply the archived set since the manager does not own the Store.
    pub async fn cleanup_stale(
        &self,
        archived_worktrees: &[(PathBuf, std::time::SystemTime)],
        max_age: Duration,
    ) -> usize {
        let now = std::time::SystemTime::now();
        let mut removed = 0;
        for (path, created_at) in archived_worktrees {
            if now.duration_since(*created_at).unwrap_or_default() >= max_age {
                if let Err(e) = tokio::fs::remove_dir_all(path).await {
                    warn!(path = %path.display(), error = %e, "stale worktree cleanup failed");
                } else {
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Lowercase, hyphenate, collapse, trim, cap (§4.B.1).
pub fn slugify(title: &str) -> String {
    const MAX_LEN: usize = 40;
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    let capped = if trimmed.len() > MAX_LEN {
        trimmed[..MAX_LEN].trim_end_matches('-')
    } else {
        trimmed
    };
    if capped.is_empty() {
        "task".to_string()
    } else {
        capped.to_string()
    }
}

/// Disambiguate a slug against `taken` with a short hash of `task_id`
/// (§4.B.1, testable property §8.7).
pub fn unique_slug(title: &str, task_id: uuid::Uuid, taken: &HashSet<String>) -> String {
    let base = slugify(title);
    if !taken.contains(&base) {
        return base;
    }
    let hash = blake3::hash(task_id.as_bytes());
    format!("{base}-{}", &hash.to_hex()[..6])
}

pub fn sanitize_name(name: &str) -> String {
    slugify(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct SharedMockGitRunner {
        calls: Mutex<Vec<Vec<String>>>,
        fail_add_worktree: bool,
        fail_merge: bool,
        fail_rebase: bool,
    }

    #[async_trait]
    impl GitRunner for SharedMockGitRunner {
        async fn run(&self, _cwd: &Path, args: &[&str]) -> Result<GitOutput, WorktreeError> {
            let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            self.calls.lock().unwrap().push(owned.clone());
            let head = owned.first().map(String::as_str);
            if self.fail_add_worktree && head == Some("worktree") {
                return Ok(GitOutput {
                    status_ok: false,
                    stdout: String::new(),
                    stderr: "simulated failure".into(),
                });
            }
            if self.fail_merge && head == Some("merge") && owned.get(1).map(String::as_str) != Some("--abort") {
                return Ok(GitOutput {
                    status_ok: false,
                    stdout: String::new(),
                    stderr: "CONFLICT (content): Merge conflict in src/x.rs".into(),
                });
            }
            if self.fail_rebase && head == Some("rebase") && owned.get(1).map(String::as_str) != Some("--abort") {
                return Ok(GitOutput {
                    status_ok: false,
                    stdout: String::new(),
                    stderr: "CONFLICT (content): Merge conflict in src/x.rs".into(),
                });
            }
            if head == Some("rev-parse") {
                return Ok(GitOutput {
                    status_ok: true,
                    stdout: "abcdef\n".into(),
                    stderr: String::new(),
                });
            }
            if head == Some("diff") && owned.iter().any(|a| a == "--diff-filter=U") {
                return Ok(GitOutput {
                    status_ok: true,
                    stdout: "src/x.rs\n".into(),
                    stderr: String::new(),
                });
            }
            if head == Some("diff") {
                return Ok(GitOutput {
                    status_ok: true,
                    stdout: "diff --git a/x b/x\n+hello\n".into(),
                    stderr: String::new(),
                });
            }
            Ok(GitOutput {
                status_ok: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn sample_task() -> Task {
        Task::new(Uuid::new_v4(), "Fix login", crate::types::TaskType::Auto)
    }

    /// Each test gets its own repo path, not a shared constant — the repo
    /// lock (§4.I) is keyed by path and held for the test's lifetime, so
    /// reusing one path across tests would make them contend with each other.
    fn sample_repo(task: &Task, unique_path: &Path) -> Repo {
        let mut repo = Repo::new(task.project_id, unique_path.display().to_string(), "backend");
        repo.default_branch = Some("main".to_string());
        repo
    }

    #[tokio::test]
    async fn create_workspace_resolves_target_branch_and_writes_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner::default());
        let manager = WorktreeManager::new(dir.path(), git.clone());
        let task = sample_task();
        let repo = sample_repo(&task, &dir.path().join("origin"));

        let workspace = manager
            .create_workspace(&task, &[repo.clone()], None, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(workspace.repos.len(), 1);
        assert_eq!(workspace.repos[0].target_branch, "main");
        let worktree_path = PathBuf::from(&workspace.repos[0].worktree_path);
        assert!(worktree_path.join(".kagan").join("session.json").exists());
        assert!(worktree_path.join("start_prompt.md").exists());
    }

    #[tokio::test]
    async fn missing_target_branch_is_a_descriptive_error() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner::default());
        let manager = WorktreeManager::new(dir.path(), git);
        let task = sample_task();
        let mut repo = sample_repo(&task, &dir.path().join("origin"));
        repo.default_branch = None;

        let err = manager
            .create_workspace(&task, &[repo], None, &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::NoTargetBranch { .. }));
    }

    #[tokio::test]
    async fn add_worktree_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner {
            fail_add_worktree: true,
            ..Default::default()
        });
        let manager = WorktreeManager::new(dir.path(), git);
        let task = sample_task();
        let repo = sample_repo(&task, &dir.path().join("origin"));

        let err = manager
            .create_workspace(&task, &[repo], None, &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::GitFailed(_)));
    }

    #[tokio::test]
    async fn diff_against_target_concatenates_per_repo_output() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner::default());
        let manager = WorktreeManager::new(dir.path(), git);
        let task = sample_task();
        let repo = sample_repo(&task, &dir.path().join("origin"));

        let workspace = manager
            .create_workspace(&task, &[repo.clone()], None, &HashSet::new())
            .await
            .unwrap();

        let diff = manager.diff_against_target(&workspace, &[repo]).await.unwrap();
        assert!(diff.contains("backend"));
        assert!(diff.contains("+hello"));
    }

    #[tokio::test]
    async fn merge_to_main_checks_out_target_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner::default());
        let manager = WorktreeManager::new(dir.path(), git.clone());
        let task = sample_task();
        let repo = sample_repo(&task, &dir.path().join("origin"));

        let result = manager.merge_to_main(&repo, "task/fix-login", "main").await.unwrap();
        assert_eq!(result, MergeResult::Success);

        let calls = git.calls.lock().unwrap();
        assert_eq!(calls[0], vec!["checkout".to_string(), "main".to_string()]);
        assert_eq!(calls[1], vec!["merge".to_string(), "--no-ff".to_string(), "task/fix-login".to_string()]);
    }

    #[tokio::test]
    async fn merge_to_main_reports_conflicted_files_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner {
            fail_merge: true,
            ..Default::default()
        });
        let manager = WorktreeManager::new(dir.path(), git.clone());
        let task = sample_task();
        let repo = sample_repo(&task, &dir.path().join("origin"));

        let result = manager.merge_to_main(&repo, "task/fix-login", "main").await.unwrap();
        assert_eq!(result, MergeResult::Conflict(vec!["src/x.rs".to_string()]));

        let calls = git.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c == &vec!["merge".to_string(), "--abort".to_string()]));
    }

    #[tokio::test]
    async fn rebase_onto_target_reports_conflicted_files_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner {
            fail_rebase: true,
            ..Default::default()
        });
        let manager = WorktreeManager::new(dir.path(), git.clone());

        let outcome = manager.rebase_onto_target(dir.path(), "main").await.unwrap();
        assert_eq!(outcome, RebaseOutcome::Conflict(vec!["src/x.rs".to_string()]));

        let calls = git.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c == &vec!["rebase".to_string(), "--abort".to_string()]));
    }

    #[tokio::test]
    async fn create_workspace_fails_when_repo_is_already_locked() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(SharedMockGitRunner::default());
        let manager = WorktreeManager::new(dir.path(), git);
        let task = sample_task();
        let repo_path = dir.path().join("origin");
        let repo = sample_repo(&task, &repo_path);

        let first = manager
            .create_workspace(&task, &[repo.clone()], None, &HashSet::new())
            .await
            .unwrap();

        let second_task = Task::new(task.project_id, "Fix login again", crate::types::TaskType::Auto);
        let err = manager
            .create_workspace(&second_task, &[repo.clone()], None, &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::RepoLocked { .. }));

        lockfile::release_repo_lock(&repo_path);
        let _ = first;
    }

    #[test]
    fn slugify_is_stable_under_idempotent_whitespace() {
        assert_eq!(slugify("Fix   login   bug"), slugify("Fix login bug"));
        assert_eq!(slugify("Fix login bug"), "fix-login-bug");
    }

    #[test]
    fn unique_slug_disambiguates_on_collision() {
        let mut taken = HashSet::new();
        taken.insert("fix-login".to_string());
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let slug_a = unique_slug("Fix login", id_a, &taken);
        let slug_b = unique_slug("Fix login", id_b, &taken);
        assert_ne!(slug_a, slug_b);
        assert!(slug_a.starts_with("fix-login-"));
    }

    #[test]
    fn unique_slug_is_identity_when_not_taken() {
        let slug = unique_slug("Fix login", Uuid::new_v4(), &HashSet::new());
        assert_eq!(slug, "fix-login");
    }
}

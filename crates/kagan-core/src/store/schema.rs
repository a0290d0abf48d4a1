//! Schema DDL, applied once per connection (§4.A). Pragmas mirror
//! `at-core/src/cache.rs`'s `init_schema`; WAL + `foreign_keys=ON` additionally
//! follow `original_source/src/kagan/core/adapters/db/engine.py`, which sets
//! `foreign_keys=ON` per-connection since SQLite does not persist it in the
//! database file itself.
pub const DDL: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA busy_timeout=5000;

-- Legacy tables from a prior schema generation; dropped unconditionally
-- before create so a first boot against an old database file never sees
-- them (§9 design note).
DROP TABLE IF EXISTS task_events;
DROP TABLE IF EXISTS agent_logs;
DROP TABLE IF EXISTS scratchpads;

CREATE TABLE IF NOT EXISTS projects (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repos (
    id             TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path           TEXT NOT NULL,
    display_name   TEXT NOT NULL,
    default_branch TEXT,
    display_order  INTEGER NOT NULL DEFAULT 0,
    scripts        TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_repos_project ON repos(project_id);

CREATE TABLE IF NOT EXISTS tasks (
    id                  TEXT PRIMARY KEY,
    project_id          TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    parent_id           TEXT REFERENCES tasks(id) ON DELETE SET NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    status              TEXT NOT NULL,
    priority            TEXT NOT NULL,
    task_type           TEXT NOT NULL,
    agent_backend       TEXT,
    base_branch         TEXT,
    acceptance_criteria TEXT NOT NULL DEFAULT '[]',
    terminal_backend    TEXT,
    scratchpad          TEXT NOT NULL DEFAULT '',
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status  ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_parent  ON tasks(parent_id);

CREATE TABLE IF NOT EXISTS workspaces (
    id      TEXT PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    status  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workspaces_task ON workspaces(task_id);

CREATE TABLE IF NOT EXISTS workspace_repos (
    workspace_id  TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    repo_id       TEXT NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    worktree_path TEXT NOT NULL,
    branch_name   TEXT NOT NULL,
    target_branch TEXT NOT NULL,
    PRIMARY KEY (workspace_id, repo_id)
);

CREATE TABLE IF NOT EXISTS executions (
    id           TEXT PRIMARY KEY,
    task_id      TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    status       TEXT NOT NULL,
    exit_code    INTEGER,
    run_index    INTEGER NOT NULL,
    metadata     TEXT NOT NULL DEFAULT '{}',
    log          TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_task ON executions(task_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_executions_task_run ON executions(task_id, run_index);

CREATE TABLE IF NOT EXISTS session_records (
    id           TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    session_type TEXT NOT NULL,
    status       TEXT NOT NULL,
    external_id  TEXT,
    started_at   TEXT NOT NULL,
    ended_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON session_records(workspace_id);

CREATE TABLE IF NOT EXISTS audit_log (
    request_id     TEXT NOT NULL,
    session_id     TEXT NOT NULL,
    capability     TEXT NOT NULL,
    method         TEXT NOT NULL,
    params_digest  TEXT NOT NULL,
    success        INTEGER NOT NULL,
    timestamp      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);

CREATE TABLE IF NOT EXISTS runtime_context (
    id                   INTEGER PRIMARY KEY CHECK (id = 0),
    active_project_id    TEXT,
    active_repo_id       TEXT,
    last_active_context  TEXT
);
";

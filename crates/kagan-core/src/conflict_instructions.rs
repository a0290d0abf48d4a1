//! Rebase-conflict instruction builder (§4.B), reproducing the original's
//! literal template from `original_source/src/kagan/agents/conflict_instructions.py`.

/// Build agent-ready Markdown instructions for resolving rebase conflicts.
pub fn build_conflict_resolution_instructions(
    source_branch: &str,
    target_branch: &str,
    conflict_files: &[String],
    repo_name: Option<&str>,
) -> String {
    let repo_ctx = repo_name.map(|r| format!(" in {r}")).unwrap_or_default();
    let file_list = if conflict_files.is_empty() {
        "  (unknown)".to_string()
    } else {
        conflict_files
            .iter()
            .map(|f| format!("  - {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## Rebase Conflict Resolution Required\n\n\
A rebase of `{source_branch}` onto `{target_branch}`{repo_ctx} produced conflicts\n\
in {count} file(s):\n\n\
{file_list}\n\n\
### Steps to resolve\n\n\
1. Run `git rebase {target_branch}` to begin the rebase.\n\
2. For each conflicted file, open it, resolve the conflict markers\n\
   (`<<<<<<<`, `=======`, `>>>>>>>`), and save.\n\
3. Stage resolved files: `git add <file>`.\n\
4. Continue the rebase: `GIT_EDITOR=true git rebase --continue`.\n\
5. Repeat steps 2-4 if additional commits produce conflicts.\n\n\
### Important\n\n\
- Preserve the intent of both sides when resolving conflicts.\n\
- Run any relevant tests after resolving to verify correctness.\n\
- Do NOT use `git rebase --skip` unless you are certain the commit is unnecessary.\n",
        count = conflict_files.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_conflict_files() {
        let text = build_conflict_resolution_instructions(
            "task/fix-login",
            "main",
            &["src/auth.rs".to_string(), "src/lib.rs".to_string()],
            Some("backend"),
        );
        assert!(text.contains("  - src/auth.rs"));
        assert!(text.contains("  - src/lib.rs"));
        assert!(text.contains("in backend"));
        assert!(text.contains("2 file(s)"));
    }

    #[test]
    fn unknown_file_list_when_empty() {
        let text = build_conflict_resolution_instructions("a", "b", &[], None);
        assert!(text.contains("(unknown)"));
        assert!(!text.contains(" in "));
    }
}

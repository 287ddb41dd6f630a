//! Integration tests for the Git interface.
//!
//! These tests use real git repositories created via tempfile to verify
//! that the Git interface works correctly with actual git operations.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use stagehand::core::types::{BranchName, ChangeKind, ConflictSide, FileChange, ResetMode};
use stagehand::git::{Git, GitError, GitState, IntegrationOutcome};

/// Test fixture that creates a real git repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit on main.
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        std::fs::write(dir.path().join("README.md"), "# Test Repo\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git(&self) -> Git {
        Git::open(self.path()).expect("failed to open test repo")
    }

    fn write(&self, file: &str, content: &str) {
        std::fs::write(self.path().join(file), content).unwrap();
    }

    fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.path().join(file)).unwrap()
    }

    fn commit_file(&self, file: &str, content: &str, message: &str) {
        self.write(file, content);
        run_git(self.path(), &["add", file]);
        run_git(self.path(), &["commit", "-m", message]);
    }

    /// `feature` and `main` both edit README.md; HEAD is on main.
    fn diverged(&self) {
        run_git(self.path(), &["checkout", "-b", "feature"]);
        self.commit_file("README.md", "feature\n", "feature edit");
        run_git(self.path(), &["checkout", "main"]);
        self.commit_file("README.md", "main\n", "main edit");
    }
}

/// Run a git command in the given directory.
fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// Parent commit ids of `rev`, in order.
fn parents_of(dir: &Path, rev: &str) -> Vec<String> {
    let output = Command::new("git")
        .args(["rev-list", "--parents", "-n", "1", rev])
        .current_dir(dir)
        .output()
        .expect("git command failed");
    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}

fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn open_from_subdirectory() {
    let repo = TestRepo::new();
    let subdir = repo.path().join("subdir");
    std::fs::create_dir(&subdir).unwrap();

    assert!(Git::open(&subdir).is_ok());
}

#[test]
fn open_non_repository_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Git::open(dir.path()),
        Err(GitError::NotARepo { .. })
    ));
}

#[test]
fn init_creates_unborn_branch() {
    let dir = TempDir::new().unwrap();
    let git = Git::init(dir.path()).unwrap();

    assert_eq!(git.try_head_oid().unwrap(), None);
    let head = git.head_info().unwrap();
    assert!(!head.is_detached);
    assert_eq!(head.head, None);
}

// =============================================================================
// Status
// =============================================================================

#[test]
fn status_splits_staged_unstaged_and_untracked() {
    let repo = TestRepo::new();
    repo.write("staged.txt", "s");
    run_git(repo.path(), &["add", "staged.txt"]);
    repo.write("README.md", "changed\n");
    repo.write("untracked.txt", "u");

    let status = repo.git().status().unwrap();
    assert_eq!(
        status.staged,
        vec![FileChange::new("staged.txt", ChangeKind::Added)]
    );
    assert_eq!(
        status.unstaged,
        vec![
            FileChange::new("README.md", ChangeKind::Modified),
            FileChange::new("untracked.txt", ChangeKind::Added),
        ]
    );
    assert_eq!(status.untracked, 1);
    assert!(status.has_tracked_changes());
}

#[test]
fn staged_then_edited_path_is_only_unstaged() {
    let repo = TestRepo::new();
    repo.write("README.md", "first\n");
    run_git(repo.path(), &["add", "README.md"]);
    repo.write("README.md", "second\n");

    let status = repo.git().status().unwrap();
    assert!(status.staged.is_empty());
    assert_eq!(status.unstaged.len(), 1);
}

#[test]
fn discard_removes_paths_head_does_not_know() {
    let repo = TestRepo::new();
    repo.write("staged.txt", "new\n");
    run_git(repo.path(), &["add", "staged.txt"]);
    repo.write("loose.txt", "loose\n");
    repo.write("README.md", "edited\n");

    let git = repo.git();
    git.discard(&[
        "staged.txt".to_string(),
        "loose.txt".to_string(),
        "README.md".to_string(),
    ])
    .unwrap();

    assert!(!repo.path().join("staged.txt").exists());
    assert!(!repo.path().join("loose.txt").exists());
    let status = git.status().unwrap();
    assert!(status.staged.is_empty());
    assert!(status.unstaged.is_empty());
}

#[test]
fn deleted_file_can_be_staged_by_path() {
    let repo = TestRepo::new();
    std::fs::remove_file(repo.path().join("README.md")).unwrap();

    let git = repo.git();
    git.stage(&["README.md".to_string()]).unwrap();
    assert_eq!(
        git.status().unwrap().staged,
        vec![FileChange::new("README.md", ChangeKind::Deleted)]
    );
}

// =============================================================================
// Commit, reset, branches and tags
// =============================================================================

#[test]
fn commit_requires_changes_and_message() {
    let repo = TestRepo::new();
    let git = repo.git();

    assert!(matches!(git.commit("   "), Err(GitError::EmptyMessage)));
    assert!(matches!(git.commit("empty"), Err(GitError::NothingToCommit)));

    repo.write("new.txt", "x");
    git.stage_all().unwrap();
    let oid = git.commit("add new").unwrap();
    assert_eq!(git.head_oid().unwrap(), oid);
    assert_eq!(git.commit_info(&oid).unwrap().summary, "add new");
}

#[test]
fn reset_soft_keeps_changes_staged() {
    let repo = TestRepo::new();
    let first = repo.git().head_oid().unwrap();
    repo.commit_file("two.txt", "2", "second");

    let git = repo.git();
    git.reset(first.as_str(), ResetMode::Soft).unwrap();
    assert_eq!(git.head_oid().unwrap(), first);
    assert_eq!(
        git.status().unwrap().staged,
        vec![FileChange::new("two.txt", ChangeKind::Added)]
    );
}

#[test]
fn current_branch_cannot_be_deleted() {
    let repo = TestRepo::new();
    let git = repo.git();

    assert!(matches!(
        git.delete_branch(&branch("main")),
        Err(GitError::BranchCheckedOut { .. })
    ));
    git.create_branch(&branch("topic"), None).unwrap();
    assert!(matches!(
        git.create_branch(&branch("topic"), None),
        Err(GitError::BranchExists { .. })
    ));
    git.delete_branch(&branch("topic")).unwrap();
    assert_eq!(git.list_branches().unwrap(), vec![branch("main")]);
}

#[test]
fn annotated_and_lightweight_tags() {
    let repo = TestRepo::new();
    let git = repo.git();

    git.create_tag("v1", None).unwrap();
    git.create_tag("v2", Some("second release")).unwrap();
    assert_eq!(git.list_tags().unwrap(), vec!["v1", "v2"]);
    assert!(matches!(
        git.create_tag("bad..name", None),
        Err(GitError::InvalidName { .. })
    ));

    git.delete_tag("v1").unwrap();
    assert_eq!(git.list_tags().unwrap(), vec!["v2"]);
}

// =============================================================================
// Checkout
// =============================================================================

#[test]
fn checkout_refuses_to_overwrite_local_changes() {
    let repo = TestRepo::new();
    repo.diverged();
    repo.write("README.md", "local edit\n");

    let git = repo.git();
    let err = git.checkout_branch(&branch("feature")).unwrap_err();
    match err {
        GitError::CheckoutConflict { paths, .. } => assert_eq!(paths, vec!["README.md"]),
        other => panic!("unexpected {other:?}"),
    }
    // Nothing moved.
    assert_eq!(git.current_branch().unwrap(), Some(branch("main")));
    assert_eq!(repo.read("README.md"), "local edit\n");
}

#[test]
fn detached_checkout() {
    let repo = TestRepo::new();
    let first = repo.git().head_oid().unwrap();
    repo.commit_file("two.txt", "2", "second");

    let git = repo.git();
    let head = git.checkout_detached(first.as_str()).unwrap();
    assert!(head.is_detached);
    assert_eq!(head.head, Some(first));
    assert!(git.is_head_detached().unwrap());
}

// =============================================================================
// Stash
// =============================================================================

#[test]
fn stash_save_apply_drop() {
    let repo = TestRepo::new();
    repo.write("README.md", "wip\n");

    let mut git = repo.git();
    let entry = git.stash_save(Some("wip"), false).unwrap().unwrap();
    assert_eq!(entry.index, 0);
    assert_eq!(repo.read("README.md"), "# Test Repo\n");

    let conflicts = git.stash_apply(0).unwrap();
    assert!(conflicts.is_empty());
    assert_eq!(repo.read("README.md"), "wip\n");

    let dropped = git.stash_drop(0).unwrap();
    assert_eq!(dropped.oid, entry.oid);
    assert!(git.stash_list().unwrap().is_empty());
}

#[test]
fn stash_save_without_changes_is_none() {
    let repo = TestRepo::new();
    assert_eq!(repo.git().stash_save(None, true).unwrap(), None);
}

#[test]
fn untracked_files_stashed_only_when_asked() {
    let repo = TestRepo::new();
    repo.write("scratch.txt", "x");

    let mut git = repo.git();
    assert_eq!(git.stash_save(None, false).unwrap(), None);
    assert!(git.stash_save(None, true).unwrap().is_some());
    assert!(!repo.path().join("scratch.txt").exists());
}

#[test]
fn stash_indices_shift_after_drop() {
    let repo = TestRepo::new();
    let mut git = repo.git();

    repo.write("README.md", "one\n");
    let older = git.stash_save(Some("one"), false).unwrap().unwrap();
    repo.write("README.md", "two\n");
    git.stash_save(Some("two"), false).unwrap();

    assert_eq!(git.stash_index_of(&older.oid).unwrap(), 1);
    git.stash_drop(0).unwrap();
    assert_eq!(git.stash_index_of(&older.oid).unwrap(), 0);
    assert_eq!(git.stash_clear().unwrap(), 1);
}

#[test]
fn stash_apply_blocked_by_local_changes_touches_nothing() {
    let repo = TestRepo::new();
    let mut git = repo.git();
    repo.write("README.md", "stashed\n");
    git.stash_save(None, false).unwrap();
    repo.write("README.md", "local\n");

    assert!(matches!(
        git.stash_apply(0),
        Err(GitError::CheckoutConflict { .. })
    ));
    assert_eq!(repo.read("README.md"), "local\n");
    assert_eq!(git.stash_list().unwrap().len(), 1);
}

// =============================================================================
// Merge and rebase
// =============================================================================

#[test]
fn merge_fast_forwards_when_possible() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-b", "feature"]);
    repo.commit_file("f.txt", "f", "feature");
    run_git(repo.path(), &["checkout", "main"]);

    let git = repo.git();
    let outcome = git.merge_into_head("feature").unwrap();
    assert!(matches!(outcome, IntegrationOutcome::FastForward { .. }));
    assert_eq!(git.state(), GitState::Clean);
    assert_eq!(repo.read("f.txt"), "f");

    assert_eq!(
        git.merge_into_head("feature").unwrap(),
        IntegrationOutcome::UpToDate
    );
}

#[test]
fn merge_creates_commit_for_diverged_history() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-b", "feature"]);
    repo.commit_file("f.txt", "f", "feature");
    run_git(repo.path(), &["checkout", "main"]);
    repo.commit_file("m.txt", "m", "main");

    let git = repo.git();
    let IntegrationOutcome::Merged { commit } = git.merge_into_head("feature").unwrap() else {
        panic!("expected a merge commit");
    };
    assert_eq!(git.head_oid().unwrap(), commit);
    assert_eq!(git.state(), GitState::Clean);
}

#[test]
fn conflicting_merge_then_resolve_and_continue() {
    let repo = TestRepo::new();
    repo.diverged();

    let git = repo.git();
    let outcome = git.merge_into_head("feature").unwrap();
    assert_eq!(
        outcome,
        IntegrationOutcome::Conflicts {
            paths: vec![FileChange::new("README.md", ChangeKind::Conflicted)]
        }
    );
    assert_eq!(git.state(), GitState::Merge);
    assert!(matches!(
        git.continue_merge(),
        Err(GitError::UnmergedEntries { .. })
    ));

    git.resolve_using("README.md", ConflictSide::Ours).unwrap();
    assert_eq!(repo.read("README.md"), "main\n");
    assert!(matches!(
        git.resolve_using("README.md", ConflictSide::Ours),
        Err(GitError::NotConflicted { .. })
    ));

    let merge = git.continue_merge().unwrap();
    assert_eq!(git.state(), GitState::Clean);
    assert_eq!(
        parents_of(repo.path(), merge.as_str()),
        vec![
            git.resolve_revision("main~1").unwrap().to_string(),
            git.resolve_revision("feature").unwrap().to_string(),
        ]
    );
}

#[test]
fn commit_during_merge_records_merge_head_as_parent() {
    let repo = TestRepo::new();
    repo.diverged();

    let git = repo.git();
    git.merge_into_head("feature").unwrap();
    git.resolve_using("README.md", ConflictSide::Theirs).unwrap();

    let oid = git.commit("Merge feature by hand").unwrap();
    assert_eq!(git.state(), GitState::Clean);
    assert_eq!(parents_of(repo.path(), oid.as_str()).len(), 2);
    assert_eq!(repo.read("README.md"), "feature\n");
}

#[test]
fn abort_merge_restores_head() {
    let repo = TestRepo::new();
    repo.diverged();

    let git = repo.git();
    git.merge_into_head("feature").unwrap();
    git.abort_merge().unwrap();
    assert_eq!(git.state(), GitState::Clean);
    assert_eq!(repo.read("README.md"), "main\n");
    assert!(matches!(
        git.abort_merge(),
        Err(GitError::NotInProgress { .. })
    ));
}

#[test]
fn rebase_replays_local_commits() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-b", "feature"]);
    repo.commit_file("f.txt", "f", "feature");
    run_git(repo.path(), &["checkout", "main"]);
    repo.commit_file("m.txt", "m", "main");
    let main_tip = repo.git().head_oid().unwrap();
    run_git(repo.path(), &["checkout", "feature"]);

    let git = repo.git();
    let IntegrationOutcome::Rebased { head } = git.rebase_onto("main").unwrap() else {
        panic!("expected a rebase");
    };
    assert_eq!(git.head_oid().unwrap(), head);
    assert_eq!(git.merge_base(&head, &main_tip).unwrap(), Some(main_tip));
    assert_eq!(git.current_branch().unwrap(), Some(branch("feature")));
}

#[test]
fn conflicting_rebase_mark_resolved_and_continue() {
    let repo = TestRepo::new();
    repo.diverged();
    run_git(repo.path(), &["checkout", "feature"]);

    let git = repo.git();
    let outcome = git.rebase_onto("main").unwrap();
    assert!(outcome.has_conflicts());
    assert!(git.state().is_rebase());

    repo.write("README.md", "both\n");
    git.mark_resolved("README.md").unwrap();
    let outcome = git.continue_rebase().unwrap();
    assert!(matches!(outcome, IntegrationOutcome::Rebased { .. }));
    assert_eq!(git.state(), GitState::Clean);
    assert_eq!(repo.read("README.md"), "both\n");
}

#[test]
fn rebase_refuses_with_uncommitted_changes() {
    let repo = TestRepo::new();
    repo.diverged();
    run_git(repo.path(), &["checkout", "feature"]);
    repo.write("README.md", "dirty\n");

    assert!(matches!(
        repo.git().rebase_onto("main"),
        Err(GitError::CheckoutConflict { .. })
    ));
}

#[test]
fn ahead_behind_counts() {
    let repo = TestRepo::new();
    repo.diverged();
    repo.commit_file("m2.txt", "m2", "main again");

    let git = repo.git();
    let main = git.resolve_revision("main").unwrap();
    let feature = git.resolve_revision("feature").unwrap();
    assert_eq!(git.ahead_behind(&main, &feature).unwrap(), (2, 1));
}

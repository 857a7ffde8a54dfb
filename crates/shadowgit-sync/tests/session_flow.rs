use git2::{Repository, Signature};
use serde_json::json;
use shadowgit_core::config::{Config, IdentityConfig};
use shadowgit_sync::{AccumulateOutcome, Mirror, SyncEngine};
use shadowgit_vcs::{MergeOutcome, VcsAdapter};
use std::path::Path;

fn commit_all(repo: &Repository, message: &str) -> String {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("test", "test@example.com").unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
        .to_string()
}

fn init_git_repo(dir: &Path) -> Repository {
    let repo = Repository::init(dir).unwrap();
    std::fs::write(dir.join("a.py"), "print('a')\n").unwrap();
    std::fs::write(dir.join("b.py"), "print('b')\n").unwrap();
    commit_all(&repo, "initial");
    repo
}

fn new_engine(dir: &Path) -> SyncEngine {
    SyncEngine::open(dir, Config::default()).unwrap()
}

fn commit_count(engine: &SyncEngine) -> usize {
    engine
        .mirror()
        .adapter()
        .log(engine.mirror().mirror_root(), "HEAD", 1000, None)
        .unwrap()
        .len()
}

#[test]
fn init_pins_primary_commit_and_mirrors_content() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = init_git_repo(tmp.path());
    let head = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();

    assert!(!Mirror::exists(tmp.path()));
    let mirror = Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    assert!(Mirror::exists(tmp.path()));
    assert_eq!(mirror.record().primary_initial_commit, head);

    for file in ["a.py", "b.py"] {
        assert_eq!(
            std::fs::read(tmp.path().join(file)).unwrap(),
            std::fs::read(mirror.mirror_root().join(file)).unwrap()
        );
    }

    let err = Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap_err();
    assert!(err.to_string().contains("already initialized"));
}

#[test]
fn session_commit_carries_narration_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    let mut engine = new_engine(tmp.path());
    let before = commit_count(&engine);

    engine.session_start("s1", None, None).unwrap();
    std::fs::write(tmp.path().join("a.py"), "print('a2')\n").unwrap();
    engine
        .accumulate_change(Path::new("a.py"), "Edit", json!({"old_string": "a", "new_string": "a2"}))
        .unwrap();
    std::fs::write(tmp.path().join("b.py"), "print('b2')\n").unwrap();
    let outcome = engine
        .accumulate_change(&tmp.path().join("b.py"), "Write", json!({"content": "print('b2')\n"}))
        .unwrap();
    assert_eq!(
        outcome,
        AccumulateOutcome::Recorded {
            session_id: "s1".into(),
            change_count: 2
        }
    );

    let report = engine.session_end(Some("Added feature X")).unwrap();
    let commit = report.commit.unwrap();
    assert_eq!(commit_count(&engine), before + 1);

    let log = engine
        .mirror()
        .adapter()
        .log(engine.mirror().mirror_root(), &commit, 1, None)
        .unwrap();
    let message = &log[0].message;
    assert!(message.starts_with("Added feature X"));
    assert!(message.contains("Files: a.py,b.py"));
    assert!(message.contains("Changes: 2"));
    assert!(message.contains("Session: s1"));

    let note = engine.mirror().read_session_note(&commit).unwrap().unwrap();
    assert_eq!(note.session_id, "s1");
    assert_eq!(note.files, vec!["a.py", "b.py"]);
    assert_eq!(note.tools, vec!["Edit", "Write"]);
    assert_eq!(note.change_count, 2);

    let found = engine.mirror().commits_for_session("s1", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, commit);
}

#[test]
fn repeated_edits_to_one_file_make_one_commit() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    let mut engine = new_engine(tmp.path());
    engine.session_start("s1", None, None).unwrap();
    let before = commit_count(&engine);

    for n in 0..3 {
        std::fs::write(tmp.path().join("a.py"), format!("print({n})\n")).unwrap();
        engine
            .accumulate_change(Path::new("a.py"), "Write", json!({}))
            .unwrap();
    }
    let report = engine.session_end(None).unwrap();
    assert_eq!(report.files, vec!["a.py"]);
    assert_eq!(commit_count(&engine), before + 1);

    let log = engine
        .mirror()
        .adapter()
        .log(engine.mirror().mirror_root(), "HEAD", 1, None)
        .unwrap();
    assert!(log[0].message.starts_with("Write on 1 files"));
    assert!(log[0].message.contains("Changes: 3"));
}

#[test]
fn empty_session_makes_no_commit() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    let mut engine = new_engine(tmp.path());
    engine.session_start("s1", None, None).unwrap();
    let head = engine
        .mirror()
        .adapter()
        .resolve_head(engine.mirror().mirror_root())
        .unwrap();

    let report = engine.session_end(Some("nothing happened")).unwrap();
    assert_eq!(report.session_id.as_deref(), Some("s1"));
    assert!(report.commit.is_none());
    assert_eq!(
        engine
            .mirror()
            .adapter()
            .resolve_head(engine.mirror().mirror_root())
            .unwrap(),
        head
    );
    assert!(engine.session_end(None).unwrap().commit.is_none());
}

#[test]
fn records_pin_the_primary_head_at_record_time() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    let mut engine = new_engine(tmp.path());
    engine.session_start("s1", None, None).unwrap();

    let first_head = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();
    std::fs::write(tmp.path().join("a.py"), "print('x')\n").unwrap();
    engine
        .accumulate_change(Path::new("a.py"), "Write", json!({}))
        .unwrap();

    std::fs::write(tmp.path().join("c.py"), "print('c')\n").unwrap();
    let second_head = commit_all(&repo, "human commit");
    std::fs::write(tmp.path().join("b.py"), "print('y')\n").unwrap();
    engine
        .accumulate_change(Path::new("b.py"), "Write", json!({}))
        .unwrap();

    let changes = &engine.current().unwrap().changes;
    assert_eq!(changes[0].parent_repo_hash(), Some(first_head.as_str()));
    assert_eq!(changes[1].parent_repo_hash(), Some(second_head.as_str()));
    assert_ne!(changes[0].parent_repo_hash(), changes[1].parent_repo_hash());
}

#[test]
fn accumulated_files_are_mirrored_byte_for_byte() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    let mut engine = new_engine(tmp.path());
    engine.session_start("s1", None, None).unwrap();

    std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
    std::fs::write(tmp.path().join("pkg/mod.py"), [0u8, 159, 146, 150, b'\n']).unwrap();
    engine
        .accumulate_change(Path::new("pkg/mod.py"), "Write", json!({}))
        .unwrap();
    assert_eq!(
        std::fs::read(tmp.path().join("pkg/mod.py")).unwrap(),
        std::fs::read(engine.mirror().mirror_root().join("pkg/mod.py")).unwrap()
    );

    let record = &engine.current().unwrap().changes[0];
    assert!(record.old_content().is_none());
    assert_eq!(record.relative_path(), "pkg/mod.py");
}

#[test]
fn human_edits_are_committed_before_a_session_starts() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();
    std::fs::write(tmp.path().join("b.py"), "print('human')\n").unwrap();

    let mut engine = new_engine(tmp.path());
    assert_eq!(engine.pending_user_changes().unwrap(), vec!["b.py"]);
    let report = engine.session_start("s1", None, None).unwrap();
    let commit = report.user_commit.unwrap();
    let log = engine
        .mirror()
        .adapter()
        .log(engine.mirror().mirror_root(), &commit, 1, None)
        .unwrap();
    assert!(log[0].message.starts_with("user: modified 1 files"));
    assert!(engine.pending_user_changes().unwrap().is_empty());
}

#[test]
fn concurrent_sessions_get_isolated_branches_and_merge_back() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();

    let mut s0 = new_engine(tmp.path());
    let r0 = s0.session_start("s0", None, Some(true)).unwrap();
    assert!(r0.branch_name.is_none());

    let mut s1 = new_engine(tmp.path());
    let r1 = s1.session_start("s1", Some("alpha"), Some(true)).unwrap();
    let mut s2 = new_engine(tmp.path());
    let r2 = s2.session_start("s2", Some("alpha"), Some(true)).unwrap();

    let (b1, b2) = (r1.branch_name.unwrap(), r2.branch_name.unwrap());
    let (w1, w2) = (r1.worktree_path.unwrap(), r2.worktree_path.unwrap());
    assert_ne!(b1, b2);
    assert_ne!(w1, w2);
    assert!(b1.starts_with("session-alpha-"));
    assert!(w1.join("a.py").is_file());

    std::fs::write(tmp.path().join("x.py"), "x = 1\n").unwrap();
    s1.accumulate_change(Path::new("x.py"), "Write", json!({}))
        .unwrap();
    std::fs::write(tmp.path().join("y.py"), "y = 2\n").unwrap();
    s2.accumulate_change(Path::new("y.py"), "Write", json!({}))
        .unwrap();

    assert!(w1.join("x.py").is_file());
    assert!(!w1.join("y.py").exists());
    assert!(!w2.join("x.py").exists());
    assert_eq!(s0.active_sessions().unwrap().len(), 2);

    let end1 = s1.session_end(None).unwrap();
    assert!(matches!(end1.merge, Some(MergeOutcome::FastForward { .. })));
    let end2 = s2.session_end(None).unwrap();
    let Some(MergeOutcome::Merged { commit }) = end2.merge else {
        panic!("expected a merge commit, got {:?}", end2.merge);
    };

    let mirror_root = s0.mirror().mirror_root().to_path_buf();
    assert_eq!(std::fs::read_to_string(mirror_root.join("x.py")).unwrap(), "x = 1\n");
    assert_eq!(std::fs::read_to_string(mirror_root.join("y.py")).unwrap(), "y = 2\n");
    assert!(!w1.exists());
    assert!(!w2.exists());
    assert!(!s0.mirror().adapter().branch_exists(&mirror_root, &b1));
    assert!(s0.active_sessions().unwrap().is_empty());

    let note = s0.mirror().read_session_note(&commit).unwrap().unwrap();
    assert_eq!(note.session_id, "s2");

    assert!(s0.session_end(None).unwrap().commit.is_none());
    assert!(s0.tracked_sessions().unwrap().is_empty());
}

fn no_auto_merge() -> Config {
    let mut config = Config::default();
    config.session.auto_merge = false;
    config
}

fn main_head(engine: &SyncEngine) -> String {
    let root = engine.mirror().mirror_root();
    engine
        .mirror()
        .adapter()
        .resolve_ref(root, &format!("refs/heads/{}", shadowgit_core::constants::MIRROR_MAIN_BRANCH))
        .unwrap()
}

#[test]
fn dirty_main_checkout_keeps_the_session_commit_and_branch() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();

    let mut s0 = new_engine(tmp.path());
    s0.session_start("s0", None, Some(true)).unwrap();
    let mut s1 = new_engine(tmp.path());
    let r1 = s1.session_start("s1", None, Some(true)).unwrap();
    let branch = r1.branch_name.unwrap();

    std::fs::write(tmp.path().join("a.py"), "print('from s0')\n").unwrap();
    s0.accumulate_change(Path::new("a.py"), "Write", json!({}))
        .unwrap();
    std::fs::write(tmp.path().join("a.py"), "print('from s1')\n").unwrap();
    s1.accumulate_change(Path::new("a.py"), "Write", json!({}))
        .unwrap();

    let main_before = main_head(&s0);
    let end1 = s1.session_end(None).unwrap();
    let commit = end1.commit.expect("session commit is reported");
    assert_eq!(
        end1.merge,
        Some(MergeOutcome::Conflicted {
            paths: vec!["a.py".to_string()]
        })
    );
    assert_eq!(main_head(&s0), main_before);

    let mirror_root = s0.mirror().mirror_root().to_path_buf();
    assert!(s0.mirror().adapter().branch_exists(&mirror_root, &branch));
    assert_eq!(
        std::fs::read_to_string(mirror_root.join("a.py")).unwrap(),
        "print('from s0')\n"
    );
    let note = s0.mirror().read_session_note(&commit).unwrap().unwrap();
    assert_eq!(note.session_id, "s1");
    let still_active = s0.active_sessions().unwrap();
    assert_eq!(still_active.len(), 1);
    assert_eq!(still_active[0].session_id, "s1");

    assert!(s0.session_end(None).unwrap().commit.is_some());
}

#[test]
fn overlapping_branch_edits_are_escalated_as_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();

    let mut s0 = new_engine(tmp.path());
    s0.session_start("s0", None, Some(true)).unwrap();
    let mut s1 = new_engine(tmp.path());
    s1.session_start("s1", None, Some(true)).unwrap();
    let mut s2 = new_engine(tmp.path());
    let r2 = s2.session_start("s2", None, Some(true)).unwrap();
    let (b2, w2) = (r2.branch_name.unwrap(), r2.worktree_path.unwrap());

    std::fs::write(tmp.path().join("a.py"), "print('one')\n").unwrap();
    s1.accumulate_change(Path::new("a.py"), "Write", json!({}))
        .unwrap();
    std::fs::write(tmp.path().join("a.py"), "print('two')\n").unwrap();
    s2.accumulate_change(Path::new("a.py"), "Write", json!({}))
        .unwrap();

    let end1 = s1.session_end(None).unwrap();
    assert!(matches!(end1.merge, Some(MergeOutcome::FastForward { .. })));
    let end2 = s2.session_end(None).unwrap();
    assert!(end2.commit.is_some());
    assert_eq!(
        end2.merge,
        Some(MergeOutcome::Conflicted {
            paths: vec!["a.py".to_string()]
        })
    );

    let mirror_root = s0.mirror().mirror_root().to_path_buf();
    assert_eq!(
        std::fs::read_to_string(mirror_root.join("a.py")).unwrap(),
        "print('one')\n"
    );
    assert!(s0.mirror().adapter().branch_exists(&mirror_root, &b2));
    assert!(w2.exists());
    let still_active = s0.active_sessions().unwrap();
    assert_eq!(still_active.len(), 1);
    assert_eq!(still_active[0].session_id, "s2");
}

#[test]
fn diverged_branch_is_skipped_without_auto_merge() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();

    let mut s0 = new_engine(tmp.path());
    s0.session_start("s0", None, Some(true)).unwrap();
    let mut s1 = SyncEngine::open(tmp.path(), no_auto_merge()).unwrap();
    s1.session_start("s1", None, Some(true)).unwrap();
    let mut s2 = SyncEngine::open(tmp.path(), no_auto_merge()).unwrap();
    let r2 = s2.session_start("s2", None, Some(true)).unwrap();
    let (b2, w2) = (r2.branch_name.unwrap(), r2.worktree_path.unwrap());

    std::fs::write(tmp.path().join("x.py"), "x = 1\n").unwrap();
    s1.accumulate_change(Path::new("x.py"), "Write", json!({}))
        .unwrap();
    std::fs::write(tmp.path().join("y.py"), "y = 2\n").unwrap();
    s2.accumulate_change(Path::new("y.py"), "Write", json!({}))
        .unwrap();

    let end1 = s1.session_end(None).unwrap();
    assert!(matches!(end1.merge, Some(MergeOutcome::FastForward { .. })));
    let main_before = main_head(&s0);
    let end2 = s2.session_end(None).unwrap();
    assert!(end2.commit.is_some());
    assert_eq!(end2.merge, Some(MergeOutcome::Skipped));
    assert_eq!(main_head(&s0), main_before);

    let mirror_root = s0.mirror().mirror_root().to_path_buf();
    assert!(!mirror_root.join("y.py").exists());
    assert!(w2.join("y.py").is_file());
    assert!(s0.mirror().adapter().branch_exists(&mirror_root, &b2));
    assert_eq!(s0.active_sessions().unwrap().len(), 1);
}

#[test]
fn stale_sessions_are_pruned_and_release_their_files() {
    let tmp = tempfile::tempdir().unwrap();
    init_git_repo(tmp.path());
    Mirror::init(tmp.path(), &IdentityConfig::default()).unwrap();

    let mut forgotten = new_engine(tmp.path());
    forgotten.session_start("forgotten", None, None).unwrap();
    std::fs::write(tmp.path().join("b.py"), "print('abandoned')\n").unwrap();
    forgotten
        .accumulate_change(Path::new("b.py"), "Write", json!({}))
        .unwrap();

    let engine = new_engine(tmp.path());
    assert!(engine.prune_stale_sessions().unwrap().is_empty());
    assert_eq!(engine.tracked_sessions().unwrap().len(), 1);

    std::fs::write(tmp.path().join("b.py"), "print('human again')\n").unwrap();
    assert!(engine.pending_user_changes().unwrap().is_empty());

    std::thread::sleep(std::time::Duration::from_secs(2));
    let mut config = Config::default();
    config.session.stale_after_secs = 1;
    let engine = SyncEngine::open(tmp.path(), config).unwrap();
    let dropped = engine.prune_stale_sessions().unwrap();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].id, "forgotten");
    assert!(engine.tracked_sessions().unwrap().is_empty());
    assert_eq!(engine.pending_user_changes().unwrap(), vec!["b.py"]);
}

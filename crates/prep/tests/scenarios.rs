//! End-to-end prepare-stage scenarios.
//!
//! These tests drive the public synthesizer API the way the admission loop
//! does and check the prepared transactions against an in-memory tree.
//!
//! ## Test Categories
//!
//! - **Single operations**: create, setData and delete through the pending window
//! - **Sequential names**: suffixes come from the pre-increment child generation
//! - **Batches**: visibility inside a batch and rollback on failure
//! - **Overlay**: pending state equals the tree after applying every transaction

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]

use std::sync::Arc;

use arbor_prep::{
    AtomicTokenSource, InMemorySessionTracker, Request, SessionOwner, SessionTracker, TxnSynthesizer,
};
use arbor_state::{CommittedTree, InMemoryTree};
use arbor_test_utils::{strategies, test_prep_config};
use arbor_types::{
    Acl, CreateMode, ErrorCode, KeeperError, OpCode, SessionId, Txn, Zxid,
    requests::{CreateRequest, DeleteRequest, MultiRequest, Op, SetDataRequest},
};
use proptest::prelude::*;
use serde::Serialize;

const SESSION: SessionId = SessionId::new(0x42);
const OWNER: SessionOwner = SessionOwner::new(3);

struct Stage {
    tree: Arc<InMemoryTree>,
    synth: TxnSynthesizer,
}

impl Stage {
    fn new() -> Self {
        let tree = Arc::new(InMemoryTree::new());
        let sessions = Arc::new(InMemorySessionTracker::new());
        sessions.track_session(SESSION, 30_000);
        let synth = TxnSynthesizer::builder()
            .config(test_prep_config())
            .tree(tree.clone())
            .sessions(sessions)
            .tokens(Arc::new(AtomicTokenSource::new(Zxid::new(0))))
            .build()
            .expect("valid config");
        Self { tree, synth }
    }

    fn run<T: Serialize>(&self, op: OpCode, body: &T) -> Request {
        let mut request =
            Request::encoded(SESSION, 1, op, body).expect("encode").with_owner(OWNER);
        self.synth.prepare(&mut request);
        request
    }

    fn create(&self, path: &str, mode: CreateMode, data: &[u8]) -> Request {
        self.run(OpCode::Create, &create_body(path, mode, data))
    }

    fn set_data(&self, path: &str, data: &[u8], version: i32) -> Request {
        self.run(OpCode::SetData, &SetDataRequest { path: path.into(), data: data.to_vec(), version })
    }

    fn delete(&self, path: &str, version: i32) -> Request {
        self.run(OpCode::Delete, &DeleteRequest { path: path.into(), version })
    }
}

fn create_body(path: &str, mode: CreateMode, data: &[u8]) -> CreateRequest {
    CreateRequest {
        path: path.into(),
        data: data.to_vec(),
        acl: Some(Acl::open_unsafe()),
        flags: mode.flag(),
    }
}

fn sub_results(request: &Request) -> Vec<(OpCode, Txn)> {
    let Some(Txn::Multi { txns }) = &request.txn else {
        panic!("expected a multi transaction, got {:?}", request.txn);
    };
    txns.iter().map(|sub| (sub.op, sub.decode().expect("decode"))).collect()
}

// ============================================================================
// Single operations
// ============================================================================

#[test]
fn test_create_touches_root() {
    let stage = Stage::new();
    let root_before = stage.tree.node("/").expect("root");

    let request = stage.create("/a", CreateMode::Persistent, b"v");
    assert_eq!(request.error, None);
    assert_eq!(
        request.txn,
        Some(Txn::Create {
            path: "/a".into(),
            data: b"v".to_vec(),
            acl: Acl::open_unsafe(),
            ephemeral: false,
            parent_cversion: root_before.stat.cversion + 1,
        })
    );

    let root = stage.synth.resolver().resolve("/").expect("root");
    assert_eq!(root.child_count, root_before.child_count + 1);
    assert_eq!(root.stat.expect("live").pzxid, request.hdr.expect("header").zxid);
    assert!(stage.tree.node("/a").is_none(), "nothing commits during prepare");
}

#[test]
fn test_set_data_version_race() {
    let stage = Stage::new();
    stage.create("/a", CreateMode::Persistent, b"v");

    let first = stage.set_data("/a", b"1", 0);
    assert_eq!(first.error, None);
    assert_eq!(stage.synth.resolver().resolve("/a").expect("a").stat.expect("live").version, 1);

    let repeat = stage.set_data("/a", b"1", 0);
    assert_eq!(repeat.error, Some(KeeperError::BadVersion { path: "/a".into() }));
    assert_eq!(repeat.txn, Some(Txn::error(ErrorCode::BadVersion)));
}

#[test]
fn test_delete_hides_node_in_pending_window() {
    let stage = Stage::new();
    let created = stage.create("/a", CreateMode::Persistent, b"v");
    let hdr = created.hdr.expect("header");
    stage.tree.apply(&hdr, created.txn.as_ref().expect("txn")).expect("apply");

    let deleted = stage.delete("/a", -1);
    assert_eq!(deleted.error, None);
    assert!(stage.tree.node("/a").is_some(), "delete is still pending");
    assert_eq!(
        stage.synth.resolver().resolve("/a"),
        Err(KeeperError::NoNode { path: "/a".into() })
    );
}

#[test]
fn test_sequential_suffixes_follow_generation() {
    let stage = Stage::new();
    stage.create("/q", CreateMode::Persistent, b"");
    stage.create("/q/seed", CreateMode::Persistent, b"");
    let g = stage.synth.resolver().resolve("/q").expect("q").stat.expect("live").cversion;

    let first = stage.create("/q/job-", CreateMode::PersistentSequential, b"");
    let second = stage.create("/q/job-", CreateMode::EphemeralSequential, b"");
    let path_of = |request: &Request| match &request.txn {
        Some(Txn::Create { path, .. }) => path.clone(),
        other => panic!("unexpected txn {other:?}"),
    };
    assert_eq!(path_of(&first), format!("/q/job-{g:010}"));
    assert_eq!(path_of(&second), format!("/q/job-{:010}", g + 1));
    let parent = stage.synth.resolver().resolve("/q").expect("q");
    assert_eq!(parent.stat.expect("live").cversion, g + 2);
    assert_eq!(parent.child_count, 3);
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_batch_sees_its_own_changes() {
    let stage = Stage::new();
    let ops = vec![
        Op::Create(create_body("/x", CreateMode::Persistent, b"")),
        Op::SetData(SetDataRequest { path: "/x".into(), data: b"y".to_vec(), version: 0 }),
    ];
    let request = stage.run(OpCode::Multi, &MultiRequest { ops });
    assert_eq!(request.error, None);
    let subs = sub_results(&request);
    let expected = Txn::SetData { path: "/x".into(), data: b"y".to_vec(), version: 1 };
    assert_eq!(subs[1], (OpCode::SetData, expected));
    assert_eq!(stage.synth.resolver().resolve("/x").expect("x").stat.expect("live").version, 1);
}

#[test]
fn test_batch_rollback_keeps_earlier_requests() {
    let stage = Stage::new();
    stage.create("/held", CreateMode::Persistent, b"");
    let before = stage.synth.ledger().records();

    let ops = vec![
        Op::Create(create_body("/held/child", CreateMode::Persistent, b"")),
        Op::Delete(DeleteRequest { path: "/held".into(), version: -1 }),
    ];
    let request = stage.run(OpCode::Multi, &MultiRequest { ops });
    assert_eq!(request.error, Some(KeeperError::NotEmpty { path: "/held".into() }));
    assert_eq!(stage.synth.ledger().records(), before);
    assert!(stage.synth.resolver().lookup("/held").is_some());
    assert!(stage.synth.resolver().lookup("/held/child").is_none());
}

// ============================================================================
// Digest chain
// ============================================================================

#[test]
fn test_digest_chain_matches_applied_tree() {
    let stage = Stage::new();
    let requests = vec![
        stage.create("/a", CreateMode::Persistent, b"1"),
        stage.create("/a/b", CreateMode::Ephemeral, b"2"),
        stage.set_data("/a", b"3", -1),
        stage.run(OpCode::CreateContainer, &create_body("/c", CreateMode::Container, b"")),
        stage.delete("/a/b", -1),
    ];
    for request in &requests {
        assert_eq!(request.error, None);
        let hdr = request.hdr.expect("header");
        stage.tree.apply(&hdr, request.txn.as_ref().expect("txn")).expect("apply");
        assert_eq!(request.txn_digest.expect("digest").tree_digest, stage.tree.full_digest());
    }
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Fate {
    Keep,
    Update,
    Remove,
    UpdateThenRemove,
}

fn arb_fate() -> impl Strategy<Value = Fate> {
    prop_oneof![
        Just(Fate::Keep),
        Just(Fate::Update),
        Just(Fate::Remove),
        Just(Fate::UpdateThenRemove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Resolving through the pending ledger yields exactly the state of a
    /// tree to which every prepared transaction has been applied in order.
    #[test]
    fn prop_pending_overlay_matches_applied_tree(
        plan in (1usize..6).prop_flat_map(|n| (
            strategies::arb_distinct_top_level(n),
            proptest::collection::vec((arb_fate(), strategies::arb_data()), n),
        )),
    ) {
        let (paths, fates) = plan;
        let stage = Stage::new();
        let mut prepared = Vec::new();

        for (path, (_, data)) in paths.iter().zip(&fates) {
            prepared.push(stage.create(path, CreateMode::Persistent, data));
        }
        for (path, (fate, data)) in paths.iter().zip(&fates) {
            if matches!(fate, Fate::Update | Fate::UpdateThenRemove) {
                let mut reversed = data.clone();
                reversed.reverse();
                prepared.push(stage.set_data(path, &reversed, 0));
            }
        }
        for (path, (fate, _)) in paths.iter().zip(&fates) {
            if matches!(fate, Fate::Remove | Fate::UpdateThenRemove) {
                prepared.push(stage.delete(path, -1));
            }
        }

        let applied = InMemoryTree::new();
        for request in &prepared {
            prop_assert_eq!(&request.error, &None);
            let hdr = request.hdr.expect("header");
            applied.apply(&hdr, request.txn.as_ref().expect("txn")).expect("apply");
        }

        for path in paths.iter().map(String::as_str).chain(["/"]) {
            let pending = stage.synth.resolver().lookup(path);
            let committed = applied.node(path);
            prop_assert_eq!(pending.is_some(), committed.is_some(), "existence of {}", path);
            if let (Some(pending), Some(committed)) = (pending, committed) {
                prop_assert_eq!(pending.stat, Some(committed.stat), "stat of {}", path);
                prop_assert_eq!(pending.child_count, committed.child_count);
                prop_assert_eq!(pending.data, committed.data);
            }
        }
        prop_assert_eq!(
            prepared.last().and_then(|r| r.txn_digest).map(|d| d.tree_digest),
            Some(applied.full_digest())
        );
    }

    /// A batch failing at item `k` records one result per item, marks every
    /// later item inconsistent and leaves no pending residue.
    #[test]
    fn prop_failed_batch_leaves_no_residue(
        paths in strategies::arb_distinct_top_level(6),
        k in 0usize..6,
    ) {
        let stage = Stage::new();
        let before = stage.synth.ledger().records();
        let ops: Vec<Op> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                if i == k {
                    Op::SetData(SetDataRequest { path: "/absent".into(), data: vec![], version: -1 })
                } else {
                    Op::Create(create_body(path, CreateMode::Persistent, b""))
                }
            })
            .collect();

        let request = stage.run(OpCode::Multi, &MultiRequest { ops });
        prop_assert_eq!(request.error.as_ref().map(KeeperError::code), Some(ErrorCode::NoNode));

        let subs = sub_results(&request);
        prop_assert_eq!(subs.len(), paths.len());
        prop_assert_eq!(&subs[k], &(OpCode::Error, Txn::error(ErrorCode::NoNode)));
        for sub in &subs[k + 1..] {
            prop_assert_eq!(sub, &(OpCode::Error, Txn::error(ErrorCode::RuntimeInconsistency)));
        }
        for sub in &subs[..k] {
            prop_assert_eq!(sub.0, OpCode::Create);
        }

        prop_assert_eq!(stage.synth.ledger().records(), before);
        for path in &paths {
            prop_assert!(stage.synth.resolver().lookup(path).is_none());
        }
        let root = stage.synth.resolver().resolve("/").expect("root");
        prop_assert_eq!(Some(root.stat.expect("live")), stage.tree.node("/").map(|n| n.stat));
    }
}

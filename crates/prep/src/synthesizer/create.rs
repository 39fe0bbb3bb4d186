//! Node creation: `create`, `create2`, `createContainer` and `createTTL`.

use arbor_state::ChangeRecord;
use arbor_types::{
    Acl, CONTAINER_EPHEMERAL_OWNER, CreateMode, DigestOp, EphemeralType, KeeperError, MAX_TTL,
    OpCode, Perms, Stat, Txn,
    requests::{CreateRequest, CreateTtlRequest},
    validation::{parent_path, sequential_path},
};

use super::{OpContext, Prepared, TxnSynthesizer};
use crate::{
    error::Result,
    guard::{validate_create_path, validate_path},
};

/// Create payload normalized across the create variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CreateArgs {
    pub(crate) path: String,
    pub(crate) data: Vec<u8>,
    pub(crate) acl: Option<Vec<Acl>>,
    pub(crate) flags: i32,
    /// `-1` for requests without a TTL.
    pub(crate) ttl: i64,
}

impl From<CreateRequest> for CreateArgs {
    fn from(req: CreateRequest) -> Self {
        Self { path: req.path, data: req.data, acl: req.acl, flags: req.flags, ttl: -1 }
    }
}

impl From<CreateTtlRequest> for CreateArgs {
    fn from(req: CreateTtlRequest) -> Self {
        Self { path: req.path, data: req.data, acl: req.acl, flags: req.flags, ttl: req.ttl }
    }
}

impl TxnSynthesizer {
    pub(crate) fn prepare_create(
        &self,
        op: OpCode,
        args: CreateArgs,
        ctx: &OpContext<'_>,
    ) -> Result<Prepared> {
        let bad_arguments = || KeeperError::BadArguments { path: args.path.clone() };
        let mode = CreateMode::from_flag(args.flags).ok_or_else(bad_arguments)?;
        if (op == OpCode::CreateContainer) != mode.is_container() {
            return Err(bad_arguments().into());
        }
        if mode.is_ttl() && op != OpCode::CreateTtl {
            return Err(bad_arguments().into());
        }
        self.validate_create_request(&args.path, mode, args.ttl, ctx)?;

        validate_create_path(&args.path, self.config.fail_create)?;
        let CreateArgs { path, data, acl, ttl, .. } = args;
        let acl = self.guard.fixup_acl(&path, ctx.auth_info, acl)?;

        let parent_path =
            parent_path(&path).ok_or_else(|| KeeperError::BadArguments { path: path.clone() })?;
        let parent = self.resolver.resolve(parent_path)?;
        self.guard.check_acl(ctx.auth_info, &parent.acl, Perms::CREATE, &path, Some(&acl))?;
        let Some(parent_stat) = parent.stat else {
            return Err(KeeperError::NoNode { path: parent_path.to_string() }.into());
        };

        let path = if mode.is_sequential() { sequential_path(&path, parent_stat.cversion) } else { path };
        validate_path(&path, self.config.max_path_bytes)?;
        if self.resolver.lookup(&path).is_some() {
            return Err(KeeperError::NodeExists { path }.into());
        }
        if parent_stat.ephemeral_type() == EphemeralType::Normal {
            return Err(KeeperError::NoChildrenForEphemerals { path }.into());
        }
        let new_cversion = parent_stat.cversion.wrapping_add(1);

        let txn = match op {
            OpCode::CreateContainer => Txn::CreateContainer {
                path: path.clone(),
                data: data.clone(),
                acl: acl.clone(),
                parent_cversion: new_cversion,
            },
            OpCode::CreateTtl => Txn::CreateTtl {
                path: path.clone(),
                data: data.clone(),
                acl: acl.clone(),
                parent_cversion: new_cversion,
                ttl,
            },
            _ => Txn::Create {
                path: path.clone(),
                data: data.clone(),
                acl: acl.clone(),
                ephemeral: mode.is_ephemeral(),
                parent_cversion: new_cversion,
            },
        };

        let owner = if mode.is_container() {
            CONTAINER_EPHEMERAL_OWNER
        } else if mode.is_ttl() {
            EphemeralType::ttl_owner(ttl)
        } else if mode.is_ephemeral() {
            ctx.session_id.value()
        } else {
            0
        };

        let mut touched = parent.duplicate(ctx.zxid);
        touched.child_count += 1;
        if let Some(stat) = touched.stat.as_mut() {
            stat.cversion = new_cversion;
            stat.pzxid = ctx.zxid;
        }
        self.append(touched, DigestOp::Update, parent.digest.as_ref());

        let child = ChangeRecord::new(ctx.zxid, path, Stat::created(ctx.zxid, ctx.time, owner), 0, acl, data);
        let digest = self.append(child, DigestOp::Add, None);
        Ok(Prepared::new(txn, digest))
    }

    /// TTL and session checks for a create.
    fn validate_create_request(
        &self,
        path: &str,
        mode: CreateMode,
        ttl: i64,
        ctx: &OpContext<'_>,
    ) -> Result<()> {
        if mode.is_ttl() && !self.config.extended_types_enabled {
            return Err(KeeperError::Unimplemented {
                message: "TTL nodes are disabled (extended types not enabled)".to_string(),
            }
            .into());
        }
        let ttl_ok = if mode.is_ttl() { (1..=MAX_TTL).contains(&ttl) } else { ttl < 0 };
        if !ttl_ok {
            return Err(KeeperError::BadArguments { path: path.to_string() }.into());
        }
        if mode.is_ephemeral() {
            self.sessions.check_global_session(ctx.session_id, ctx.owner)?;
        } else {
            self.sessions.check_session(ctx.session_id, ctx.owner)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use arbor_state::CommittedTree;
    use arbor_test_utils::{
        strategies::{arb_create_mode, arb_segment},
        test_prep_config,
    };
    use arbor_types::{ErrorCode, Id, PrepConfig, Zxid};
    use proptest::prelude::*;

    use super::*;
    use crate::synthesizer::tests::{Harness, SESSION};

    fn body(path: &str, flags: i32) -> CreateRequest {
        CreateRequest { path: path.into(), data: b"v".to_vec(), acl: Some(Acl::open_unsafe()), flags }
    }

    fn ttl_body(path: &str, flags: i32, ttl: i64) -> CreateTtlRequest {
        CreateTtlRequest {
            path: path.into(),
            data: vec![],
            acl: Some(Acl::open_unsafe()),
            flags,
            ttl,
        }
    }

    fn error_of(request: &crate::request::Request) -> ErrorCode {
        request.error.as_ref().expect("failed").code()
    }

    #[test]
    fn test_create_touches_parent_and_child() {
        let h = Harness::new(PrepConfig::default());
        let root_cversion = h.tree.node("/").expect("root").stat.cversion;
        let request = h.create("/a", CreateMode::Persistent.flag());
        assert_eq!(request.error, None);

        let zxid = request.hdr.expect("header").zxid;
        assert_eq!(
            request.txn,
            Some(Txn::Create {
                path: "/a".into(),
                data: b"data".to_vec(),
                acl: Acl::open_unsafe(),
                ephemeral: false,
                parent_cversion: root_cversion + 1,
            })
        );

        let records = h.synth.ledger().records();
        assert_eq!(records.len(), 2);
        let parent = &records[0];
        assert_eq!(parent.path, "/");
        assert_eq!(parent.stat.expect("live").cversion, root_cversion + 1);
        assert_eq!(parent.stat.expect("live").pzxid, zxid);
        let child = &records[1];
        assert_eq!(child.path, "/a");
        assert_eq!(child.stat.expect("live").czxid, zxid);
        assert_eq!(child.stat.expect("live").ephemeral_owner, 0);
        assert_eq!(request.txn_digest.expect("digest").tree_digest, child.digest.expect("digest").tree_digest);
    }

    #[test]
    fn test_create_sequential_uses_parent_cversion() {
        let h = Harness::new(PrepConfig::default());
        h.create("/q", 0);
        let first = h.create("/q/item-", CreateMode::PersistentSequential.flag());
        let second = h.create("/q/item-", CreateMode::PersistentSequential.flag());
        let path_of = |r: &crate::request::Request| match r.txn.as_ref().expect("txn") {
            Txn::Create { path, .. } => path.clone(),
            other => panic!("unexpected txn {other:?}"),
        };
        assert_eq!(path_of(&first), "/q/item-0000000000");
        assert_eq!(path_of(&second), "/q/item-0000000001");
        let parent = h.synth.resolver().resolve("/q").expect("exists");
        assert_eq!(parent.stat.expect("live").cversion, 2);
        assert_eq!(parent.child_count, 2);
    }

    #[test]
    fn test_create_existing_node() {
        let h = Harness::new(PrepConfig::default());
        h.create("/a", 0);
        let request = h.create("/a", 0);
        assert_eq!(request.error, Some(KeeperError::NodeExists { path: "/a".into() }));
        assert_eq!(request.txn, Some(Txn::error(ErrorCode::NodeExists)));
    }

    #[test]
    fn test_create_ephemeral_owner_and_no_children() {
        let h = Harness::new(PrepConfig::default());
        let request = h.create("/e", CreateMode::Ephemeral.flag());
        assert!(matches!(request.txn, Some(Txn::Create { ephemeral: true, .. })));
        let node = h.synth.resolver().resolve("/e").expect("pending");
        assert_eq!(node.stat.expect("live").ephemeral_owner, SESSION.value());

        let child = h.create("/e/child", 0);
        assert_eq!(error_of(&child), ErrorCode::NoChildrenForEphemerals);
    }

    #[test]
    fn test_container_requires_container_op() {
        let h = Harness::new(PrepConfig::default());
        let request = h.run(OpCode::Create, &body("/c", CreateMode::Container.flag()));
        assert_eq!(error_of(&request), ErrorCode::BadArguments);
        let request = h.run(OpCode::CreateContainer, &body("/c", 0));
        assert_eq!(error_of(&request), ErrorCode::BadArguments);

        let request = h.run(OpCode::CreateContainer, &body("/c", CreateMode::Container.flag()));
        assert!(matches!(request.txn, Some(Txn::CreateContainer { .. })));
        let node = h.synth.resolver().resolve("/c").expect("pending");
        assert_eq!(node.stat.expect("live").ephemeral_owner, CONTAINER_EPHEMERAL_OWNER);

        // Containers may have children.
        assert_eq!(h.create("/c/child", 0).error, None);
    }

    #[test]
    fn test_ttl_requires_extended_types() {
        let h = Harness::new(PrepConfig::default());
        let request =
            h.run(OpCode::CreateTtl, &ttl_body("/t", CreateMode::PersistentWithTtl.flag(), 1000));
        assert_eq!(error_of(&request), ErrorCode::Unimplemented);
    }

    #[test]
    fn test_ttl_range_and_owner() {
        let config = PrepConfig::builder().extended_types_enabled(true).build().expect("valid");
        let h = Harness::new(config);
        let flag = CreateMode::PersistentWithTtl.flag();

        assert_eq!(error_of(&h.run(OpCode::CreateTtl, &ttl_body("/t", flag, 0))), ErrorCode::BadArguments);
        assert_eq!(
            error_of(&h.run(OpCode::CreateTtl, &ttl_body("/t", flag, MAX_TTL + 1))),
            ErrorCode::BadArguments
        );
        assert_eq!(
            error_of(&h.run(OpCode::CreateTtl, &ttl_body("/t", 0, 1000))),
            ErrorCode::BadArguments
        );
        assert_eq!(error_of(&h.run(OpCode::Create, &body("/t", flag))), ErrorCode::BadArguments);

        let request = h.run(OpCode::CreateTtl, &ttl_body("/t", flag, 1000));
        assert!(matches!(request.txn, Some(Txn::CreateTtl { ttl: 1000, .. })));
        let node = h.synth.resolver().resolve("/t").expect("pending");
        assert_eq!(EphemeralType::ttl_of(node.stat.expect("live").ephemeral_owner), Some(1000));
    }

    #[test]
    fn test_create_bad_paths() {
        let h = Harness::new(PrepConfig::default());
        assert_eq!(error_of(&h.create("noslash", 0)), ErrorCode::BadArguments);
        assert_eq!(error_of(&h.create("/a\0b", 0)), ErrorCode::BadArguments);
        h.create("/x", 0);
        assert_eq!(error_of(&h.create("/x/", 0)), ErrorCode::BadArguments);
        assert_eq!(error_of(&h.run(OpCode::Create, &body("/a", 42))), ErrorCode::BadArguments);

        let failing = Harness::new(PrepConfig::builder().fail_create(true).build().expect("valid"));
        assert_eq!(error_of(&failing.create("/a", 0)), ErrorCode::BadArguments);
    }

    #[test]
    fn test_create_requires_create_perm_on_parent() {
        let h = Harness::new(PrepConfig::default());
        let locked = CreateRequest {
            path: "/locked".into(),
            data: vec![],
            acl: Some(vec![Acl::new(Perms::READ | Perms::WRITE, Id::anyone())]),
            flags: 0,
        };
        assert_eq!(h.run(OpCode::Create, &locked).error, None);
        assert_eq!(error_of(&h.create("/locked/child", 0)), ErrorCode::NoAuth);
    }

    #[test]
    fn test_create_invalid_acl() {
        let h = Harness::new(PrepConfig::default());
        let request = h.run(
            OpCode::Create,
            &CreateRequest { path: "/a".into(), data: vec![], acl: None, flags: 0 },
        );
        assert_eq!(error_of(&request), ErrorCode::InvalidAcl);
        let request = h.run(
            OpCode::Create,
            &CreateRequest { path: "/a".into(), data: vec![], acl: Some(Acl::creator_all()), flags: 0 },
        );
        assert_eq!(error_of(&request), ErrorCode::InvalidAcl);
    }

    #[test]
    fn test_ephemeral_on_local_session() {
        let h = Harness::new(PrepConfig::default());
        let local = arbor_types::SessionId::new(0x2000);
        h.sessions.track_local_session(local, 1000);
        let mut request = crate::request::Request::encoded(
            local,
            1,
            OpCode::Create,
            &body("/e", CreateMode::Ephemeral.flag()),
        )
        .expect("encode");
        h.synth.prepare(&mut request);
        assert_eq!(error_of(&request), ErrorCode::EphemeralOnLocalSession);
        assert_eq!(request.hdr.expect("header").zxid, Zxid::new(101));
    }

    proptest! {
        #[test]
        fn prop_create_mode_shapes_pending_node(mode in arb_create_mode(), name in arb_segment()) {
            let h = Harness::new(test_prep_config());
            let op = if mode.is_container() { OpCode::CreateContainer } else { OpCode::Create };
            let path = format!("/{name}");
            let request = h.run(op, &body(&path, mode.flag()));
            prop_assert_eq!(&request.error, &None);

            let created = match request.txn.clone() {
                Some(Txn::Create { path, ephemeral, .. }) => {
                    prop_assert_eq!(ephemeral, mode.is_ephemeral());
                    path
                },
                Some(Txn::CreateContainer { path, .. }) => path,
                other => return Err(TestCaseError::fail(format!("unexpected txn {other:?}"))),
            };
            prop_assert_eq!(created.len() == path.len() + 10, mode.is_sequential());

            let node = h.synth.resolver().resolve(&created).expect("pending");
            let owner = node.stat.expect("live").ephemeral_owner;
            let expected = if mode.is_container() {
                CONTAINER_EPHEMERAL_OWNER
            } else if mode.is_ephemeral() {
                SESSION.value()
            } else {
                0
            };
            prop_assert_eq!(owner, expected);
        }
    }
}

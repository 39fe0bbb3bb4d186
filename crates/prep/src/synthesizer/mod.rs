//! Transaction synthesizer.
//!
//! Turns one client request into a transaction header and body, validating
//! it against the effective node state (pending ledger over committed tree)
//! and recording the post-image of every touched node in the ledger so later
//! requests see it before it commits.
//!
//! ## Failure handling
//!
//! The header is created before any validation, so a recognized failure
//! rewrites it to an error header and replaces the body with an error
//! transaction carrying the specific code. Anything else (undecodable
//! payloads, internal faults) is logged with the raw payload and reported
//! as a marshalling error.

mod create;
mod delete;
mod reconfig;
mod session;
mod update;

use std::sync::Arc;

use arbor_state::{
    AdditiveDigest, ChangeRecord, CommittedTree, DigestStrategy, NoDigest, NodeImage,
    NodeResolver, PendingLedger, RollbackSet,
};
use arbor_types::{
    ConfigError, DigestOp, Id, OpCode, PrecalculatedDigest, PrepConfig, SessionId, Txn,
    TxnDigest, TxnHeader, Zxid, codec,
    requests::{
        CheckVersionRequest, CreateRequest, CreateTtlRequest, DeleteRequest, SetAclRequest,
        SetDataRequest,
    },
};
use snafu::ResultExt;
use tracing::{Span, error, info, instrument, warn};

pub(crate) use self::create::CreateArgs;
use crate::{
    auth::AuthProviderRegistry,
    error::{CodecSnafu, InternalSnafu, PrepError, Result},
    guard::AclGuard,
    quorum::MembershipController,
    request::Request,
    session::{SessionOwner, SessionTracker},
    token::TokenSource,
};

/// Per-request inputs shared by every operation handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpContext<'a> {
    pub(crate) session_id: SessionId,
    pub(crate) owner: SessionOwner,
    pub(crate) auth_info: &'a [Id],
    pub(crate) zxid: Zxid,
    pub(crate) time: i64,
}

impl<'a> OpContext<'a> {
    pub(crate) fn new(request: &'a Request, hdr: &TxnHeader) -> Self {
        Self {
            session_id: request.session_id,
            owner: request.owner,
            auth_info: &request.auth_info,
            zxid: hdr.zxid,
            time: hdr.time,
        }
    }
}

/// Body and digest produced by one operation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prepared {
    pub(crate) txn: Txn,
    pub(crate) digest: Option<TxnDigest>,
}

impl Prepared {
    pub(crate) fn new(txn: Txn, digest: Option<PrecalculatedDigest>) -> Self {
        Self { txn, digest: digest.map(|d| TxnDigest::new(d.tree_digest)) }
    }
}

/// Validates requests and synthesizes their transactions.
pub struct TxnSynthesizer {
    pub(crate) config: PrepConfig,
    pub(crate) resolver: NodeResolver,
    pub(crate) ledger: Arc<PendingLedger>,
    pub(crate) tree: Arc<dyn CommittedTree>,
    pub(crate) digest: Arc<dyn DigestStrategy>,
    pub(crate) sessions: Arc<dyn SessionTracker>,
    pub(crate) tokens: Arc<dyn TokenSource>,
    pub(crate) guard: AclGuard,
    pub(crate) membership: Option<Arc<dyn MembershipController>>,
}

#[bon::bon]
impl TxnSynthesizer {
    /// Creates a synthesizer.
    ///
    /// The digest strategy follows `config.digest_enabled`. Without a
    /// membership controller, reconfiguration requests are rejected as
    /// unimplemented.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `config` is invalid.
    #[builder]
    pub fn new(
        #[builder(default)] config: PrepConfig,
        tree: Arc<dyn CommittedTree>,
        sessions: Arc<dyn SessionTracker>,
        tokens: Arc<dyn TokenSource>,
        #[builder(default = Arc::new(PendingLedger::new()))] ledger: Arc<PendingLedger>,
        #[builder(default = AuthProviderRegistry::with_defaults())] auth: AuthProviderRegistry,
        membership: Option<Arc<dyn MembershipController>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let digest: Arc<dyn DigestStrategy> = if config.digest_enabled {
            Arc::new(AdditiveDigest::new(tree.clone()))
        } else {
            Arc::new(NoDigest)
        };
        let resolver = NodeResolver::new(ledger.clone(), tree.clone(), digest.clone());
        let guard = AclGuard::new(auth, config.skip_acl);
        Ok(Self { config, resolver, ledger, tree, digest, sessions, tokens, guard, membership })
    }
}

impl TxnSynthesizer {
    /// Prepare-stage configuration.
    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Pending ledger written by this synthesizer.
    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }

    /// Resolver reading through the pending ledger.
    pub fn resolver(&self) -> &NodeResolver {
        &self.resolver
    }

    /// Token source issuing zxids.
    pub fn tokens(&self) -> &Arc<dyn TokenSource> {
        &self.tokens
    }

    /// Prepares `request` in place.
    ///
    /// Fills the header, body, digest and error slots, then stamps the
    /// newest issued zxid. Never fails: every failure is recorded on the
    /// request.
    #[instrument(
        skip_all,
        fields(session = %request.session_id, cxid = request.cxid, op = %request.op, zxid)
    )]
    pub fn prepare(&self, request: &mut Request) {
        request.clear_result();
        if let Err(err) = self.dispatch(request) {
            self.record_failure(request, &err);
        }
        self.finish(request);
    }

    /// Records an unrecognized failure (or a panic) raised while preparing
    /// `request` and stamps the zxid.
    ///
    /// Pending changes already appended under the request's zxid are
    /// discarded, so the error transaction leaves no trace in the ledger.
    pub fn fail(&self, request: &mut Request, message: impl Into<String>) {
        if let Some(hdr) = request.hdr {
            let removed = self.ledger.rollback(hdr.zxid, RollbackSet::default());
            if removed > 0 {
                warn!(zxid = %hdr.zxid, removed, "Discarded pending changes of failed request");
            }
        }
        let err = PrepError::Internal { message: message.into() };
        self.record_failure(request, &err);
        self.finish(request);
    }

    fn finish(&self, request: &mut Request) {
        if request.hdr.is_some() && request.txn_digest.is_none() && self.digest.is_enabled() {
            request.txn_digest = self.digest.txn_digest(&self.ledger);
        }
        request.zxid = self.tokens.current_zxid();
    }

    fn dispatch(&self, request: &mut Request) -> Result<()> {
        match request.op {
            OpCode::Create
            | OpCode::Create2
            | OpCode::CreateContainer
            | OpCode::CreateTtl
            | OpCode::Delete
            | OpCode::DeleteContainer
            | OpCode::SetData
            | OpCode::SetAcl
            | OpCode::Check
            | OpCode::Reconfig => {
                let hdr = self.new_header(request);
                let ctx = OpContext::new(request, &hdr);
                let prepared = self.prepare_single(&request.payload, &ctx, request.op)?;
                request.txn = Some(prepared.txn);
                request.txn_digest = prepared.digest;
                Ok(())
            },
            OpCode::Multi => self.prepare_multi(request),
            OpCode::CreateSession | OpCode::CloseSession => {
                if request.is_local_session {
                    return Ok(());
                }
                let hdr = self.new_header(request);
                let ctx = OpContext::new(request, &hdr);
                let prepared = if request.op == OpCode::CreateSession {
                    self.prepare_create_session(&request.payload, &ctx)?
                } else {
                    self.prepare_close_session(&ctx)?
                };
                request.txn = Some(prepared.txn);
                request.txn_digest = prepared.digest;
                Ok(())
            },
            OpCode::Exists
            | OpCode::GetData
            | OpCode::GetAcl
            | OpCode::GetChildren
            | OpCode::GetChildren2
            | OpCode::GetAllChildrenNumber
            | OpCode::Ping
            | OpCode::Sync
            | OpCode::SetWatches
            | OpCode::SetWatches2
            | OpCode::CheckWatches
            | OpCode::RemoveWatches
            | OpCode::GetEphemerals
            | OpCode::MultiRead
            | OpCode::AddWatch
            | OpCode::WhoAmI => {
                self.sessions.check_session(request.session_id, request.owner)?;
                Ok(())
            },
            OpCode::Notification | OpCode::Auth | OpCode::Sasl | OpCode::Error => {
                warn!(op = %request.op, "Unexpected operation type reached the prepare stage");
                Ok(())
            },
        }
    }

    /// Issues a zxid and installs the header for `request`.
    pub(crate) fn new_header(&self, request: &mut Request) -> TxnHeader {
        let zxid = self.tokens.next_zxid();
        Span::current().record("zxid", zxid.value());
        let hdr = TxnHeader {
            client_id: request.session_id,
            cxid: request.cxid,
            zxid,
            time: chrono::Utc::now().timestamp_millis(),
            op: request.op,
        };
        request.hdr = Some(hdr);
        hdr
    }

    /// Decodes `payload` for `op` and prepares it.
    fn prepare_single(&self, payload: &[u8], ctx: &OpContext<'_>, op: OpCode) -> Result<Prepared> {
        match op {
            OpCode::Create | OpCode::Create2 | OpCode::CreateContainer => {
                let req: CreateRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_create(op, CreateArgs::from(req), ctx)
            },
            OpCode::CreateTtl => {
                let req: CreateTtlRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_create(op, CreateArgs::from(req), ctx)
            },
            OpCode::Delete => {
                let req: DeleteRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_delete(&req, ctx)
            },
            OpCode::DeleteContainer => {
                let path = std::str::from_utf8(payload).map_err(|e| PrepError::Internal {
                    message: format!("container path is not UTF-8: {e}"),
                })?;
                self.prepare_delete_container(path, ctx)
            },
            OpCode::SetData => {
                let req: SetDataRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_set_data(req, ctx)
            },
            OpCode::SetAcl => {
                let req: SetAclRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_set_acl(req, ctx)
            },
            OpCode::Check => {
                let req: CheckVersionRequest = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_check(&req, ctx)
            },
            OpCode::Reconfig => {
                let req = codec::decode(payload).context(CodecSnafu)?;
                self.prepare_reconfig(req, ctx)
            },
            other => InternalSnafu { message: format!("{other} has no single-operation handler") }
                .fail(),
        }
    }

    /// Stores `record` in the ledger with its digest and returns the digest.
    ///
    /// `previous` is the digest of the image being replaced, for
    /// [`DigestOp::Update`] and [`DigestOp::Remove`].
    pub(crate) fn append(
        &self,
        mut record: ChangeRecord,
        op: DigestOp,
        previous: Option<&PrecalculatedDigest>,
    ) -> Option<PrecalculatedDigest> {
        let image =
            record.stat.as_ref().map(|stat| NodeImage { path: &record.path, data: &record.data, stat });
        let digest = self.digest.precalculate(&self.ledger, op, previous, image);
        record.digest = digest;
        self.ledger.append(record);
        digest
    }

    fn record_failure(&self, request: &mut Request, err: &PrepError) {
        let keeper = err.to_keeper_error();
        if err.is_recognized() {
            info!(
                path = keeper.path().unwrap_or(""),
                code = %err.code(),
                "Request failed validation"
            );
        } else {
            error!(
                error = %err,
                payload = %hex::encode(&request.payload),
                "Failed to prepare request"
            );
        }
        if let Some(hdr) = request.hdr.as_mut() {
            hdr.op = OpCode::Error;
            request.txn = Some(Txn::error(err.code()));
        }
        request.error = Some(keeper);
    }
}

//! Session lifecycle: `createSession` and `closeSession`.

use arbor_state::ChangeRecord;
use arbor_types::{DigestOp, Txn, codec, requests::CreateSessionRequest};
use snafu::ResultExt;
use tracing::info;

use super::{OpContext, Prepared, TxnSynthesizer};
use crate::{
    error::{CodecSnafu, Result},
    guard::parent_path_and_validate,
};

impl TxnSynthesizer {
    pub(crate) fn prepare_create_session(&self, payload: &[u8], ctx: &OpContext<'_>) -> Result<Prepared> {
        let req: CreateSessionRequest = codec::decode(payload).context(CodecSnafu)?;
        self.sessions.track_session(ctx.session_id, req.timeout);
        self.sessions.set_owner(ctx.session_id, ctx.owner)?;
        Ok(Prepared::new(Txn::CreateSession { timeout: req.timeout }, None))
    }

    /// Tombstones every ephemeral node owned by the session, committed or
    /// pending, and marks the session closing.
    ///
    /// Each removal also records the parent with one child fewer, whether or
    /// not digests are enabled.
    pub(crate) fn prepare_close_session(&self, ctx: &OpContext<'_>) -> Result<Prepared> {
        let ephemerals = self
            .ledger
            .ephemerals_for(ctx.session_id, || self.tree.ephemerals(ctx.session_id));

        for path in &ephemerals {
            let parent_path = parent_path_and_validate(path, self.tree.as_ref())?;
            let parent = self.resolver.resolve(parent_path)?;
            let mut touched = parent.duplicate(ctx.zxid);
            touched.child_count -= 1;
            if let Some(stat) = touched.stat.as_mut() {
                stat.pzxid = ctx.zxid;
            }
            self.append(touched, DigestOp::Update, parent.digest.as_ref());
            let previous = self.resolver.lookup(path).and_then(|node| node.digest);
            self.append(ChangeRecord::tombstone(ctx.zxid, path.clone()), DigestOp::Remove, previous.as_ref());
        }

        let paths: Vec<String> = if self.config.close_session_txn_enabled {
            ephemerals.into_iter().collect()
        } else {
            Vec::new()
        };
        self.sessions.set_session_closing(ctx.session_id);
        info!(session = %ctx.session_id, removed = paths.len(), "Processed session termination");
        Ok(Prepared::new(Txn::CloseSession { paths }, None))
    }
}

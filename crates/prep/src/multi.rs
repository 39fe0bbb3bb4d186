//! Atomic multi-operation coordination.
//!
//! Every operation of a batch is prepared under one zxid. The first failure
//! rolls the ledger back to its state before the batch, and every later
//! operation is recorded as a runtime-inconsistency error without being
//! evaluated.

use arbor_types::{
    ErrorCode, KeeperError, OpCode, SubTxn, Txn, codec,
    requests::{MultiRequest, Op},
    validation::parent_path,
};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    error::{CodecSnafu, PrepError, Result},
    request::Request,
    synthesizer::{CreateArgs, OpContext, Prepared, TxnSynthesizer},
};

/// Paths whose ledger entries must be restored if the batch fails: every
/// target and its parent.
fn affected_paths(ops: &[Op]) -> Vec<&str> {
    let mut paths = Vec::with_capacity(ops.len() * 2);
    for op in ops {
        let path = op.path();
        paths.push(path);
        if path.contains('\0') {
            continue;
        }
        if let Some(parent) = parent_path(path) {
            paths.push(parent);
        }
    }
    paths
}

impl TxnSynthesizer {
    pub(crate) fn prepare_multi(&self, request: &mut Request) -> Result<()> {
        let multi: MultiRequest = match codec::decode(&request.payload).context(CodecSnafu) {
            Ok(multi) => multi,
            Err(err) => {
                self.new_header(request);
                return Err(err);
            },
        };

        let hdr = self.new_header(request);
        let snapshot = self.ledger.snapshot(affected_paths(&multi.ops));
        let ctx = OpContext::new(request, &hdr);

        let mut failure: Option<KeeperError> = None;
        let mut txns = Vec::with_capacity(multi.ops.len());
        for op in multi.ops {
            let path = op.path().to_string();
            let (code, txn) = if failure.is_some() {
                (OpCode::Error, Txn::error(ErrorCode::RuntimeInconsistency))
            } else {
                let op_code = op.op_code();
                match self.prepare_op(op, &ctx) {
                    Ok(prepared) => (op_code, prepared.txn),
                    Err(PrepError::Keeper { source }) => {
                        info!(path = %path, code = %source.code(), "Multi-op item failed; rolling back batch");
                        let removed = self.ledger.rollback(hdr.zxid, snapshot.clone());
                        debug!(removed, "Rolled back pending changes");
                        let txn = Txn::error(source.code());
                        failure = Some(source);
                        (OpCode::Error, txn)
                    },
                    Err(other) => {
                        self.ledger.rollback(hdr.zxid, snapshot);
                        return Err(other);
                    },
                }
            };
            txns.push(SubTxn::new(code, &txn).context(CodecSnafu)?);
        }

        request.txn = Some(Txn::Multi { txns });
        request.txn_digest = self.digest.txn_digest(&self.ledger);
        if let Some(err) = failure {
            request.error = Some(err);
        }
        Ok(())
    }

    /// Prepares one batch item under the batch's zxid.
    fn prepare_op(&self, op: Op, ctx: &OpContext<'_>) -> Result<Prepared> {
        match op {
            Op::Create(req) => self.prepare_create(OpCode::Create, CreateArgs::from(req), ctx),
            Op::Create2(req) => self.prepare_create(OpCode::Create2, CreateArgs::from(req), ctx),
            Op::CreateContainer(req) => {
                self.prepare_create(OpCode::CreateContainer, CreateArgs::from(req), ctx)
            },
            Op::CreateTtl(req) => self.prepare_create(OpCode::CreateTtl, CreateArgs::from(req), ctx),
            Op::Delete(req) => self.prepare_delete(&req, ctx),
            Op::SetData(req) => self.prepare_set_data(req, ctx),
            Op::Check(req) => self.prepare_check(&req, ctx),
        }
    }
}

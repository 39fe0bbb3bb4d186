//! In-place updates: `setData`, `setACL` and `check`.

use arbor_types::{
    DigestOp, Perms, Txn,
    requests::{CheckVersionRequest, SetAclRequest, SetDataRequest},
};

use super::{OpContext, Prepared, TxnSynthesizer};
use crate::{
    error::Result,
    guard::{check_and_inc_version, validate_path},
};

impl TxnSynthesizer {
    pub(crate) fn prepare_set_data(&self, req: SetDataRequest, ctx: &OpContext<'_>) -> Result<Prepared> {
        self.sessions.check_session(ctx.session_id, ctx.owner)?;
        validate_path(&req.path, self.config.max_path_bytes)?;
        let node = self.resolver.resolve(&req.path)?;
        self.guard.check_acl(ctx.auth_info, &node.acl, Perms::WRITE, &req.path, None)?;
        let current = node.stat.map_or(0, |stat| stat.version);
        let version = check_and_inc_version(current, req.version, &req.path)?;

        let txn = Txn::SetData { path: req.path, data: req.data.clone(), version };
        let mut touched = node.duplicate(ctx.zxid);
        if let Some(stat) = touched.stat.as_mut() {
            stat.version = version;
            stat.mtime = ctx.time;
            stat.mzxid = ctx.zxid;
        }
        touched.data = req.data;
        let digest = self.append(touched, DigestOp::Update, node.digest.as_ref());
        Ok(Prepared::new(txn, digest))
    }

    pub(crate) fn prepare_set_acl(&self, req: SetAclRequest, ctx: &OpContext<'_>) -> Result<Prepared> {
        self.sessions.check_session(ctx.session_id, ctx.owner)?;
        validate_path(&req.path, self.config.max_path_bytes)?;
        let acl = self.guard.fixup_acl(&req.path, ctx.auth_info, req.acl)?;
        let node = self.resolver.resolve(&req.path)?;
        self.guard.check_acl(ctx.auth_info, &node.acl, Perms::ADMIN, &req.path, Some(&acl))?;
        let current = node.stat.map_or(0, |stat| stat.aversion);
        let version = check_and_inc_version(current, req.version, &req.path)?;

        let txn = Txn::SetAcl { path: req.path, acl: acl.clone(), version };
        let mut touched = node.duplicate(ctx.zxid);
        if let Some(stat) = touched.stat.as_mut() {
            stat.aversion = version;
        }
        touched.acl = acl;
        let digest = self.append(touched, DigestOp::Update, node.digest.as_ref());
        Ok(Prepared::new(txn, digest))
    }

    pub(crate) fn prepare_check(&self, req: &CheckVersionRequest, ctx: &OpContext<'_>) -> Result<Prepared> {
        self.sessions.check_session(ctx.session_id, ctx.owner)?;
        validate_path(&req.path, self.config.max_path_bytes)?;
        let node = self.resolver.resolve(&req.path)?;
        self.guard.check_acl(ctx.auth_info, &node.acl, Perms::READ, &req.path, None)?;
        let current = node.stat.map_or(0, |stat| stat.version);
        let version = check_and_inc_version(current, req.version, &req.path)?;
        Ok(Prepared::new(Txn::CheckVersion { path: req.path.clone(), version }, None))
    }
}

//! Node removal: `delete` and `deleteContainer`.

use arbor_state::ChangeRecord;
use arbor_types::{
    DigestOp, EphemeralType, KeeperError, PrecalculatedDigest, Perms, Txn, requests::DeleteRequest,
};

use super::{OpContext, Prepared, TxnSynthesizer};
use crate::{
    error::Result,
    guard::{check_and_inc_version, parent_path_and_validate},
};

impl TxnSynthesizer {
    pub(crate) fn prepare_delete(&self, req: &DeleteRequest, ctx: &OpContext<'_>) -> Result<Prepared> {
        self.sessions.check_session(ctx.session_id, ctx.owner)?;
        let path = req.path.as_str();
        let parent_path = parent_path_and_validate(path, self.tree.as_ref())?;
        let parent = self.resolver.resolve(parent_path)?;
        self.guard.check_acl(ctx.auth_info, &parent.acl, Perms::WRITE | Perms::DELETE, path, None)?;
        let node = self.resolver.resolve(path)?;
        let version = node.stat.map_or(0, |stat| stat.version);
        check_and_inc_version(version, req.version, path)?;
        if node.child_count > 0 {
            return Err(KeeperError::NotEmpty { path: path.to_string() }.into());
        }

        let digest = self.remove_node(&parent, &node, ctx);
        Ok(Prepared::new(Txn::Delete { path: path.to_string() }, digest))
    }

    pub(crate) fn prepare_delete_container(&self, path: &str, ctx: &OpContext<'_>) -> Result<Prepared> {
        let parent_path = parent_path_and_validate(path, self.tree.as_ref())?;
        let node = self.resolver.resolve(path)?;
        if node.child_count > 0 {
            return Err(KeeperError::NotEmpty { path: path.to_string() }.into());
        }
        if node.stat.is_some_and(|stat| stat.ephemeral_type() == EphemeralType::Normal) {
            return Err(KeeperError::BadVersion { path: path.to_string() }.into());
        }
        let parent = self.resolver.resolve(parent_path)?;

        let digest = self.remove_node(&parent, &node, ctx);
        Ok(Prepared::new(Txn::Delete { path: path.to_string() }, digest))
    }

    /// Detaches `node` from `parent` and appends its tombstone.
    fn remove_node(
        &self,
        parent: &ChangeRecord,
        node: &ChangeRecord,
        ctx: &OpContext<'_>,
    ) -> Option<PrecalculatedDigest> {
        let mut touched = parent.duplicate(ctx.zxid);
        touched.child_count -= 1;
        if let Some(stat) = touched.stat.as_mut() {
            stat.pzxid = ctx.zxid;
        }
        self.append(touched, DigestOp::Update, parent.digest.as_ref());

        let tombstone = ChangeRecord::tombstone(ctx.zxid, node.path.clone());
        self.append(tombstone, DigestOp::Remove, node.digest.as_ref())
    }
}

//! Dynamic membership reconfiguration.
//!
//! The proposed membership is written to the configuration node as a plain
//! `setData`; its version is the zxid of that transaction.

use arbor_types::{CONFIG_NODE, DigestOp, KeeperError, Perms, Txn, requests::ReconfigRequest};
use tracing::{info, warn};

use super::{OpContext, Prepared, TxnSynthesizer};
use crate::{
    error::Result,
    quorum::{
        LearnerRole, QuorumConfig, QuorumError, QuorumKind, QuorumServer, parse_members,
        parse_server_ids,
    },
};

fn bad_arguments(reason: impl std::fmt::Display) -> KeeperError {
    KeeperError::BadArguments { path: format!("{CONFIG_NODE}: {reason}") }
}

impl From<QuorumError> for KeeperError {
    fn from(err: QuorumError) -> Self {
        bad_arguments(err)
    }
}

impl TxnSynthesizer {
    pub(crate) fn prepare_reconfig(&self, req: ReconfigRequest, ctx: &OpContext<'_>) -> Result<Prepared> {
        if !self.config.reconfig_enabled {
            return Err(KeeperError::ReconfigDisabled.into());
        }
        if self.config.skip_acl {
            warn!("ACL checks are skipped; reconfig will not check permissions");
        }
        self.sessions.check_session(ctx.session_id, ctx.owner)?;
        let Some(membership) = self.membership.as_ref() else {
            return Err(KeeperError::Unimplemented {
                message: "reconfiguration requires a membership controller".to_string(),
            }
            .into());
        };

        let last_seen = membership.last_seen_config();
        let active = membership.active_config();
        if last_seen.version != active.version {
            return Err(KeeperError::ReconfigInProgress.into());
        }
        if req.cur_config_id != -1 && u64::try_from(req.cur_config_id).ok() != Some(last_seen.version) {
            return Err(KeeperError::BadVersion { path: CONFIG_NODE.to_string() }.into());
        }

        let servers = match req.new_members.as_deref() {
            Some(members) => replacement_members(members)?,
            None => incremental_members(&last_seen, &req)?,
        };
        let proposed = QuorumConfig { version: ctx.zxid.value(), kind: last_seen.kind, servers };

        let min_voters = self.config.min_voting_members();
        if proposed.voting_members() < min_voters {
            return Err(bad_arguments(format!(
                "new configuration must include at least {min_voters} voting members"
            ))
            .into());
        }
        if !membership.is_quorum_synced(&proposed) {
            return Err(KeeperError::NewConfigNoQuorum.into());
        }

        let node = self.resolver.resolve(CONFIG_NODE)?;
        self.guard.check_acl(ctx.auth_info, &node.acl, Perms::WRITE, CONFIG_NODE, None)?;

        let data = proposed.to_config_string().into_bytes();
        let txn = Txn::SetData { path: CONFIG_NODE.to_string(), data: data.clone(), version: -1 };
        let mut touched = node.duplicate(ctx.zxid);
        if let Some(stat) = touched.stat.as_mut() {
            stat.version = -1;
            stat.mtime = ctx.time;
            stat.mzxid = ctx.zxid;
        }
        touched.data = data;
        let digest = self.append(touched, DigestOp::Noop, None);
        info!(version = %ctx.zxid, voters = proposed.voting_members(), "Prepared reconfiguration");
        Ok(Prepared::new(txn, digest))
    }
}

/// Parses a complete replacement membership. Every voting member must name
/// an election port.
fn replacement_members(
    members: &str,
) -> Result<std::collections::BTreeMap<u64, QuorumServer>, KeeperError> {
    let servers = parse_members(members)?;
    let missing = servers
        .values()
        .find(|server| server.role == LearnerRole::Participant && server.election_addr.is_none());
    if let Some(server) = missing {
        return Err(bad_arguments(format!(
            "voting member server.{} must specify an election port",
            server.id
        )));
    }
    Ok(servers)
}

/// Applies joining and leaving servers to the last seen membership.
fn incremental_members(
    last_seen: &QuorumConfig,
    req: &ReconfigRequest,
) -> Result<std::collections::BTreeMap<u64, QuorumServer>, KeeperError> {
    if last_seen.kind != QuorumKind::Majority {
        return Err(bad_arguments(
            "incremental reconfiguration requires a majority quorum configuration",
        ));
    }
    let mut servers = last_seen.servers.clone();

    if let Some(leaving) = req.leaving_servers.as_deref() {
        for id in parse_server_ids(leaving)? {
            servers.remove(&id);
        }
    }

    if let Some(joining) = req.joining_servers.as_deref() {
        for (id, server) in parse_members(joining)? {
            if !server.has_all_ports() {
                return Err(bad_arguments(format!(
                    "server.{id} must specify election, quorum and client ports"
                )));
            }
            let conflict = servers.values().find(|other| other.id != id && server.conflicts_with(other));
            if let Some(other) = conflict {
                return Err(bad_arguments(format!(
                    "server.{id} reuses an address of server.{}",
                    other.id
                )));
            }
            servers.insert(id, server);
        }
    }
    Ok(servers)
}

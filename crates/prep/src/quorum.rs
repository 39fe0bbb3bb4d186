//! Ensemble membership model for dynamic reconfiguration.
//!
//! Membership is described by `server.N=entry` lines, where a server entry is
//! `host:quorumPort[:electionPort[:participant|observer]][;[clientHost:]clientPort]`.
//! The prepare stage parses proposed memberships, validates them, and hands
//! the serialized result to the configuration node.

use std::{collections::BTreeMap, fmt};

use parking_lot::Mutex;
use snafu::Snafu;

/// Error while parsing a membership description.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum QuorumError {
    /// Malformed server entry or membership line.
    #[snafu(display("Invalid membership entry {entry:?}: {reason}"))]
    Parse {
        /// Offending input.
        entry: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_error(entry: &str, reason: impl Into<String>) -> QuorumError {
    QuorumError::Parse { entry: entry.to_string(), reason: reason.into() }
}

/// Whether a server votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LearnerRole {
    /// Voting member.
    #[default]
    Participant,
    /// Non-voting member.
    Observer,
}

impl LearnerRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Observer => "observer",
        }
    }
}

/// One ensemble member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumServer {
    /// Server id.
    pub id: u64,
    /// Quorum (peer) address, `host:port`.
    pub addr: String,
    /// Leader-election address, `host:port`.
    pub election_addr: Option<String>,
    /// Client address, `host:port`.
    pub client_addr: Option<String>,
    /// Voting role.
    pub role: LearnerRole,
}

impl QuorumServer {
    /// Parses the right-hand side of a `server.N=` entry.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::Parse`] for a malformed entry.
    pub fn parse(id: u64, entry: &str) -> Result<Self, QuorumError> {
        let (server_part, client_part) = match entry.split_once(';') {
            Some((server, client)) => (server, Some(client)),
            None => (entry, None),
        };

        let pieces: Vec<&str> = server_part.split(':').map(str::trim).collect();
        if !(2..=4).contains(&pieces.len()) {
            return Err(parse_error(entry, "expected host:port[:port[:role]]"));
        }
        let host = pieces[0];
        if host.is_empty() {
            return Err(parse_error(entry, "missing host"));
        }
        let addr = format!("{host}:{}", parse_port(entry, pieces[1])?);
        let election_addr = match pieces.get(2) {
            Some(port) => Some(format!("{host}:{}", parse_port(entry, port)?)),
            None => None,
        };
        let role = match pieces.get(3) {
            None => LearnerRole::Participant,
            Some(role) if role.eq_ignore_ascii_case("participant") => LearnerRole::Participant,
            Some(role) if role.eq_ignore_ascii_case("observer") => LearnerRole::Observer,
            Some(role) => return Err(parse_error(entry, format!("unknown role {role:?}"))),
        };

        let client_addr = match client_part.map(str::trim) {
            None | Some("") => None,
            Some(client) => {
                let (client_host, port) = match client.rsplit_once(':') {
                    Some((client_host, port)) => (client_host, port),
                    None => ("0.0.0.0", client),
                };
                Some(format!("{client_host}:{}", parse_port(entry, port)?))
            },
        };

        Ok(Self { id, addr, election_addr, client_addr, role })
    }

    /// Whether this server specifies quorum, election and client ports.
    pub fn has_all_ports(&self) -> bool {
        self.election_addr.is_some() && self.client_addr.is_some()
    }

    /// Whether this server's quorum or election address is used by `other`.
    pub fn conflicts_with(&self, other: &QuorumServer) -> bool {
        let mine = [Some(&self.addr), self.election_addr.as_ref()];
        let theirs = [Some(&other.addr), other.election_addr.as_ref()];
        mine.iter().flatten().any(|a| theirs.iter().flatten().any(|b| a == b))
    }
}

fn parse_port(entry: &str, port: &str) -> Result<u16, QuorumError> {
    port.trim().parse::<u16>().map_err(|_| parse_error(entry, format!("invalid port {port:?}")))
}

impl fmt::Display for QuorumServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)?;
        if let Some(election) = &self.election_addr {
            let port = election.rsplit_once(':').map_or(election.as_str(), |(_, port)| port);
            write!(f, ":{port}:{}", self.role.as_str())?;
        }
        if let Some(client) = &self.client_addr {
            write!(f, ";{client}")?;
        }
        Ok(())
    }
}

/// How votes are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuorumKind {
    /// Simple majority of voting members.
    #[default]
    Majority,
    /// Weighted groups.
    Hierarchical,
}

/// A complete ensemble membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumConfig {
    /// Configuration version (the zxid that installed it).
    pub version: u64,
    /// Vote counting scheme.
    pub kind: QuorumKind,
    /// Members by id.
    pub servers: BTreeMap<u64, QuorumServer>,
}

impl QuorumConfig {
    /// Majority configuration over `servers`.
    pub fn majority(version: u64, servers: impl IntoIterator<Item = QuorumServer>) -> Self {
        Self {
            version,
            kind: QuorumKind::Majority,
            servers: servers.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Members with the participant role.
    pub fn voting_members(&self) -> usize {
        self.servers.values().filter(|s| s.role == LearnerRole::Participant).count()
    }

    /// Serialized form stored in the configuration node.
    pub fn to_config_string(&self) -> String {
        let mut out = String::new();
        for server in self.servers.values() {
            out.push_str(&format!("server.{}={server}\n", server.id));
        }
        out.push_str(&format!("version={:x}", self.version));
        out
    }
}

/// Parses a complete membership (`server.N=entry` entries separated by commas
/// or newlines). `version=` entries are ignored.
///
/// # Errors
///
/// Returns [`QuorumError::Parse`] for malformed entries.
pub fn parse_members(input: &str) -> Result<BTreeMap<u64, QuorumServer>, QuorumError> {
    let mut servers = BTreeMap::new();
    for entry in split_entries(input) {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(parse_error(entry, "expected key=value"));
        };
        if value.contains('=') {
            return Err(parse_error(entry, "more than one '='"));
        }
        let key = key.trim();
        if key == "version" {
            continue;
        }
        let id = parse_server_key(entry, key)?;
        servers.insert(id, QuorumServer::parse(id, value.trim())?);
    }
    Ok(servers)
}

/// Parses a comma-separated list of server ids.
///
/// # Errors
///
/// Returns [`QuorumError::Parse`] for a non-numeric id.
pub fn parse_server_ids(input: &str) -> Result<Vec<u64>, QuorumError> {
    split_entries(input)
        .map(|id| id.parse::<u64>().map_err(|_| parse_error(id, "invalid server id")))
        .collect()
}

fn split_entries(input: &str) -> impl Iterator<Item = &str> {
    input.split([',', '\n']).map(str::trim).filter(|entry| !entry.is_empty())
}

fn parse_server_key(entry: &str, key: &str) -> Result<u64, QuorumError> {
    key.strip_prefix("server.")
        .and_then(|id| id.parse::<u64>().ok())
        .ok_or_else(|| parse_error(entry, "expected server.N"))
}

/// Leader-side view of ensemble membership.
pub trait MembershipController: Send + Sync {
    /// Newest configuration proposed or committed.
    fn last_seen_config(&self) -> QuorumConfig;

    /// Configuration currently in force.
    fn active_config(&self) -> QuorumConfig;

    /// Whether a quorum of `proposed` is synced with the leader.
    fn is_quorum_synced(&self, proposed: &QuorumConfig) -> bool;
}

/// Fixed membership with settable state.
#[derive(Debug)]
pub struct StaticMembership {
    last_seen: Mutex<QuorumConfig>,
    active: Mutex<QuorumConfig>,
    quorum_synced: Mutex<bool>,
}

impl StaticMembership {
    /// Membership whose last-seen and active configurations are `config`.
    pub fn new(config: QuorumConfig) -> Self {
        Self {
            last_seen: Mutex::new(config.clone()),
            active: Mutex::new(config),
            quorum_synced: Mutex::new(true),
        }
    }

    /// Records a proposed configuration that has not yet been activated.
    pub fn set_last_seen(&self, config: QuorumConfig) {
        *self.last_seen.lock() = config;
    }

    /// Sets the answer of [`MembershipController::is_quorum_synced`].
    pub fn set_quorum_synced(&self, synced: bool) {
        *self.quorum_synced.lock() = synced;
    }
}

impl MembershipController for StaticMembership {
    fn last_seen_config(&self) -> QuorumConfig {
        self.last_seen.lock().clone()
    }

    fn active_config(&self) -> QuorumConfig {
        self.active.lock().clone()
    }

    fn is_quorum_synced(&self, _proposed: &QuorumConfig) -> bool {
        *self.quorum_synced.lock()
    }
}

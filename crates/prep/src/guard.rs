//! Version and ACL guard.
//!
//! Optimistic-concurrency version checks, permission checks against the
//! ACL-and-identity model, ACL fixup for create and setACL, and the path
//! checks that map malformed paths to `BadArguments`.

use arbor_state::CommittedTree;
use arbor_types::{Acl, Id, KeeperError, Perms, validation};
use tracing::error;

use crate::auth::{AuthMatch, AuthProviderRegistry};

/// Verifies `expected` against `current` and returns the next version.
///
/// `-1` matches any version. The counter wraps on overflow.
///
/// # Errors
///
/// Returns `BadVersion` when `expected` is neither `-1` nor `current`.
pub fn check_and_inc_version(current: i32, expected: i32, path: &str) -> Result<i32, KeeperError> {
    if expected != -1 && expected != current {
        return Err(KeeperError::BadVersion { path: path.to_string() });
    }
    Ok(current.wrapping_add(1))
}

/// Returns the parent of `path` after rejecting paths that cannot have one,
/// contain a NUL byte, or name a reserved node.
///
/// # Errors
///
/// Returns `BadArguments` for any of those conditions.
pub fn parent_path_and_validate<'a>(
    path: &'a str,
    tree: &dyn CommittedTree,
) -> Result<&'a str, KeeperError> {
    let bad = || KeeperError::BadArguments { path: path.to_string() };
    if path.contains('\0') || tree.is_reserved_path(path) {
        return Err(bad());
    }
    validation::parent_path(path).ok_or_else(bad)
}

/// Checks a create target before the sequential suffix is applied.
///
/// # Errors
///
/// Returns `BadArguments` when the path has no `/`, contains a NUL byte, or
/// `fail_create` is set.
pub fn validate_create_path(path: &str, fail_create: bool) -> Result<(), KeeperError> {
    if !path.contains('/') || path.contains('\0') || fail_create {
        return Err(KeeperError::BadArguments { path: path.to_string() });
    }
    Ok(())
}

/// Full path well-formedness check.
///
/// # Errors
///
/// Returns `BadArguments` when [`validation::validate_path`] rejects `path`.
pub fn validate_path(path: &str, max_path_bytes: usize) -> Result<(), KeeperError> {
    validation::validate_path(path, max_path_bytes)
        .map_err(|_| KeeperError::BadArguments { path: path.to_string() })
}

/// Permission checks and ACL fixup.
#[derive(Debug, Clone)]
pub struct AclGuard {
    registry: AuthProviderRegistry,
    skip_acl: bool,
}

impl AclGuard {
    /// Creates a guard over `registry`. With `skip_acl` every permission
    /// check passes.
    pub fn new(registry: AuthProviderRegistry, skip_acl: bool) -> Self {
        Self { registry, skip_acl }
    }

    /// Provider registry consulted by this guard.
    pub fn registry(&self) -> &AuthProviderRegistry {
        &self.registry
    }

    /// Whether permission checks are bypassed.
    pub fn skips_acl(&self) -> bool {
        self.skip_acl
    }

    /// Checks that some ACL entry granting `perm` matches one of `auth_ids`.
    ///
    /// # Errors
    ///
    /// Returns `NoAuth` when no entry matches.
    pub fn check_acl(
        &self,
        auth_ids: &[Id],
        acl: &[Acl],
        perm: Perms,
        path: &str,
        new_acl: Option<&[Acl]>,
    ) -> Result<(), KeeperError> {
        if self.skip_acl || acl.is_empty() {
            return Ok(());
        }
        if auth_ids.iter().any(|id| id.scheme == Id::SUPER_SCHEME) {
            return Ok(());
        }
        for entry in acl.iter().filter(|entry| entry.perms.intersects(perm)) {
            if entry.id.is_anyone() {
                return Ok(());
            }
            let Some(provider) = self.registry.get(&entry.id.scheme) else {
                continue;
            };
            let matched = auth_ids.iter().filter(|caller| caller.scheme == entry.id.scheme).any(
                |caller| {
                    provider.matches(&AuthMatch {
                        path,
                        caller_id: &caller.id,
                        acl_id: &entry.id.id,
                        perm,
                        new_acl,
                    })
                },
            );
            if matched {
                return Ok(());
            }
        }
        Err(KeeperError::NoAuth { path: path.to_string() })
    }

    /// Normalizes a client-supplied ACL.
    ///
    /// Duplicates are dropped keeping the first occurrence. `world:anyone`
    /// passes through, `auth` entries expand to every authenticated caller
    /// identity, and other schemes must name a valid identity of a
    /// registered provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAcl` for a missing or empty ACL, an entry without a
    /// scheme, an `auth` entry with no authenticated caller identity, or an
    /// identity no provider accepts.
    pub fn fixup_acl(
        &self,
        path: &str,
        auth_ids: &[Id],
        acl: Option<Vec<Acl>>,
    ) -> Result<Vec<Acl>, KeeperError> {
        let invalid = || KeeperError::InvalidAcl { path: path.to_string() };
        let mut unique: Vec<Acl> = Vec::new();
        for entry in acl.unwrap_or_default() {
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        if unique.is_empty() {
            return Err(invalid());
        }

        let mut fixed = Vec::with_capacity(unique.len());
        for entry in unique {
            if entry.id.scheme.is_empty() {
                return Err(invalid());
            }
            if entry.id.is_anyone() {
                fixed.push(entry);
            } else if entry.id.scheme == Id::AUTH_SCHEME {
                let mut expanded = false;
                for caller in auth_ids {
                    match self.registry.get(&caller.scheme) {
                        None => {
                            error!(scheme = %caller.scheme, path, "Missing auth provider for caller identity");
                        },
                        Some(provider) if provider.is_authenticated() => {
                            expanded = true;
                            fixed.push(Acl::new(entry.perms, caller.clone()));
                        },
                        Some(_) => {},
                    }
                }
                if !expanded {
                    return Err(invalid());
                }
            } else {
                let valid = self
                    .registry
                    .get(&entry.id.scheme)
                    .is_some_and(|provider| provider.is_valid(&entry.id.id));
                if !valid {
                    return Err(invalid());
                }
                fixed.push(entry);
            }
        }
        Ok(fixed)
    }
}

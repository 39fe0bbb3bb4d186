//! Authentication-provider seam for ACL checks.
//!
//! Every ACL entry names a scheme. A scheme other than `world` or `super` is
//! resolved through an [`AuthProvider`] looked up by scheme name in the
//! [`AuthProviderRegistry`].

use std::{collections::HashMap, net::Ipv4Addr, sync::Arc};

use arbor_types::{Acl, Perms};

/// Inputs to a provider match decision.
#[derive(Debug, Clone, Copy)]
pub struct AuthMatch<'a> {
    /// Path being accessed.
    pub path: &'a str,
    /// Identity the caller authenticated with (same scheme as `acl_id`).
    pub caller_id: &'a str,
    /// Identity named by the ACL entry.
    pub acl_id: &'a str,
    /// Permission being checked.
    pub perm: Perms,
    /// ACL being installed, for create and setACL checks.
    pub new_acl: Option<&'a [Acl]>,
}

/// Verifies identities of a single scheme.
pub trait AuthProvider: Send + Sync {
    /// Scheme handled by this provider.
    fn scheme(&self) -> &str;

    /// Whether identities of this scheme prove who the caller is, making
    /// them eligible for `auth` scheme expansion.
    fn is_authenticated(&self) -> bool;

    /// Whether `id` is well formed for this scheme.
    fn is_valid(&self, id: &str) -> bool;

    /// Whether the caller identity satisfies the ACL identity.
    fn matches(&self, request: &AuthMatch<'_>) -> bool;
}

/// `digest` scheme: `user:base64(sha1(user:password))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestAuthProvider;

impl AuthProvider for DigestAuthProvider {
    fn scheme(&self) -> &str {
        "digest"
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn is_valid(&self, id: &str) -> bool {
        id.split(':').count() == 2
    }

    fn matches(&self, request: &AuthMatch<'_>) -> bool {
        request.caller_id == request.acl_id
    }
}

/// `ip` scheme: an IPv4 address with an optional `/bits` prefix length.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpAuthProvider;

impl IpAuthProvider {
    fn parse(id: &str) -> Option<(u32, u32)> {
        let (addr, bits) = match id.split_once('/') {
            Some((addr, bits)) => (addr, bits.parse::<u32>().ok()?),
            None => (id, 32),
        };
        if bits > 32 {
            return None;
        }
        let addr: Ipv4Addr = addr.parse().ok()?;
        let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
        Some((u32::from(addr), mask))
    }
}

impl AuthProvider for IpAuthProvider {
    fn scheme(&self) -> &str {
        "ip"
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    fn is_valid(&self, id: &str) -> bool {
        Self::parse(id).is_some()
    }

    fn matches(&self, request: &AuthMatch<'_>) -> bool {
        let Some((caller, _)) = Self::parse(request.caller_id) else {
            return false;
        };
        let Some((network, mask)) = Self::parse(request.acl_id) else {
            return false;
        };
        caller & mask == network & mask
    }
}

/// Providers keyed by scheme.
#[derive(Clone, Default)]
pub struct AuthProviderRegistry {
    providers: HashMap<String, Arc<dyn AuthProvider>>,
}

impl AuthProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `digest` and `ip` providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DigestAuthProvider));
        registry.register(Arc::new(IpAuthProvider));
        registry
    }

    /// Adds or replaces the provider for its scheme.
    pub fn register(&mut self, provider: Arc<dyn AuthProvider>) {
        self.providers.insert(provider.scheme().to_string(), provider);
    }

    /// Provider for `scheme`.
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn AuthProvider>> {
        self.providers.get(scheme)
    }
}

impl std::fmt::Debug for AuthProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("AuthProviderRegistry").field("schemes", &schemes).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn request<'a>(caller_id: &'a str, acl_id: &'a str) -> AuthMatch<'a> {
        AuthMatch { path: "/a", caller_id, acl_id, perm: Perms::READ, new_acl: None }
    }

    #[test]
    fn test_digest_validity() {
        assert!(DigestAuthProvider.is_valid("alice:hash"));
        assert!(!DigestAuthProvider.is_valid("alice"));
        assert!(!DigestAuthProvider.is_valid("a:b:c"));
        assert!(DigestAuthProvider.matches(&request("alice:h", "alice:h")));
        assert!(!DigestAuthProvider.matches(&request("alice:h", "bob:h")));
    }

    #[test]
    fn test_ip_prefix_match() {
        assert!(IpAuthProvider.is_valid("10.0.0.0/8"));
        assert!(!IpAuthProvider.is_valid("10.0.0.0/40"));
        assert!(!IpAuthProvider.is_valid("not-an-ip"));
        assert!(IpAuthProvider.matches(&request("10.1.2.3", "10.0.0.0/8")));
        assert!(!IpAuthProvider.matches(&request("11.1.2.3", "10.0.0.0/8")));
        assert!(IpAuthProvider.matches(&request("192.168.1.1", "192.168.1.1")));
        assert!(IpAuthProvider.matches(&request("1.2.3.4", "0.0.0.0/0")));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = AuthProviderRegistry::with_defaults();
        assert!(registry.get("digest").expect("digest").is_authenticated());
        assert!(!registry.get("ip").expect("ip").is_authenticated());
        assert!(registry.get("sasl").is_none());
        assert_eq!(format!("{registry:?}"), r#"AuthProviderRegistry { schemes: ["digest", "ip"] }"#);
    }
}

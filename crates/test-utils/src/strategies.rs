//! Proptest strategies for arbor domain types.
//!
//! Reusable generators for property-based testing across crates. Strategies produce
//! well-formed paths, payloads and ACLs while exploring edge cases through random variation.
//!
//! # Usage
//!
//! ```no_run
//! use arbor_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(path in strategies::arb_path()) {
//!         // test invariant with a randomly generated node path
//!     }
//! }
//! ```

use arbor_types::{Acl, CreateMode, Id, Perms};
use proptest::prelude::*;

/// Generates a single path segment of 1-8 characters matching `[a-z][a-z0-9]{0,7}`.
pub fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Generates an absolute node path of 1-4 segments.
pub fn arb_path() -> impl Strategy<Value = String> {
    proptest::collection::vec(arb_segment(), 1..=4)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Generates `count` distinct top-level paths.
pub fn arb_distinct_top_level(count: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::hash_set(arb_segment(), count)
        .prop_map(|segments| segments.into_iter().map(|s| format!("/{s}")).collect())
}

/// Generates a node payload of 0-63 random bytes.
pub fn arb_data() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}

/// Generates a non-empty permission mask.
pub fn arb_perms() -> impl Strategy<Value = Perms> {
    (1u32..=Perms::ALL.bits()).prop_map(Perms::from_bits)
}

/// Generates a `world:anyone` ACL of 1-3 entries, possibly with duplicates.
pub fn arb_world_acl() -> impl Strategy<Value = Vec<Acl>> {
    proptest::collection::vec(arb_perms().prop_map(|perms| Acl::new(perms, Id::anyone())), 1..4)
}

/// Generates a creation mode without TTL.
pub fn arb_create_mode() -> impl Strategy<Value = CreateMode> {
    prop::sample::select(vec![
        CreateMode::Persistent,
        CreateMode::Ephemeral,
        CreateMode::PersistentSequential,
        CreateMode::EphemeralSequential,
        CreateMode::Container,
    ])
}

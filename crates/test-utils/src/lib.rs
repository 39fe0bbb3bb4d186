//! Shared test utilities for arbor crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`recv_forwarded`] - Collect requests forwarded to the next stage, with a deadline
//! - [`test_prep_config`] - Prepare-stage configuration for tests
//! - [`strategies`] - Proptest strategies for paths, payloads and ACLs

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod forwarded;
pub use forwarded::recv_forwarded;

mod config;
pub use config::{test_prep_config, test_prep_config_without_digest};

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    // ============================================
    // recv_forwarded tests
    // ============================================

    #[tokio::test]
    async fn test_recv_forwarded_collects_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..3 {
            tx.send(i).unwrap();
        }
        let items = recv_forwarded(&mut rx, 2, Duration::from_millis(100)).await;
        assert_eq!(items, Some(vec![0, 1]));
    }

    #[tokio::test]
    async fn test_recv_forwarded_waits_for_late_items() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send("late").unwrap();
        });
        let items = recv_forwarded(&mut rx, 1, Duration::from_secs(1)).await;
        assert_eq!(items, Some(vec!["late"]));
    }

    #[tokio::test]
    async fn test_recv_forwarded_times_out() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<u8>();
        assert_eq!(recv_forwarded(&mut rx, 1, Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn test_recv_forwarded_closed_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(1).unwrap();
        drop(tx);
        assert_eq!(recv_forwarded(&mut rx, 2, Duration::from_secs(1)).await, None);
    }

    // ============================================
    // Config helper tests
    // ============================================

    #[test]
    fn test_prep_config_is_valid() {
        let config = test_prep_config();
        assert!(config.validate().is_ok());
        assert!(config.digest_enabled);
        assert!(config.extended_types_enabled);
    }

    #[test]
    fn test_prep_config_without_digest_only_differs_in_digest() {
        let config = test_prep_config_without_digest();
        assert!(!config.digest_enabled);
        assert_eq!(arbor_types::PrepConfig { digest_enabled: true, ..config }, test_prep_config());
    }
}

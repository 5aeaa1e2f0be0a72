//! Shared utilities and common types for the Brewfleet backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Device key hashing
//! - Operator JWT claims (signing and verification)
//! - Pagination helpers
//! - Common validation logic

pub mod crypto;
pub mod jwt;
pub mod pagination;
pub mod validation;

//! Property-based tests for the ingestion core.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify the
//! quantified invariants: pacer non-negativity and monotonicity, scheduler
//! selection order and concurrency cap, monitor degradation-only
//! callbacks, and the commit-floor durability bound.

mod property;

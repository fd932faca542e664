//! Integration tests for vault-action.
//!
//! These drive the full path over an in-memory server:
//! - concurrent fetch of the three streams
//! - reconciliation and gate annotation
//! - actions and the reload that follows them

pub mod common;

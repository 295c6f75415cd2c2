//! Test Helper Utilities
//!
//! Shared utilities for testing galsync

#![allow(dead_code)]

pub mod catalog_double;

pub use catalog_double::{game, org_body, search_body, Reply, ScriptedCatalog, ScriptedTokens};

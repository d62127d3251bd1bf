//! # Communications interface crate.
//!
//! Provides the common communications interfaces for the arm software: the
//! command/response definitions shared between the arm executable and its
//! clients, and the networking abstraction both sides use.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommand definitions for the arm
pub mod tc;

/// Network module
pub mod net;

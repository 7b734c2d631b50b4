//! # canopy-core
//!
//! Core types, ID prefixes, and error types for Canopy.
//!
//! This crate provides the foundational types shared across all Canopy crates:
//! - Entity structs for the compliance sync records (licenses, sync jobs,
//!   outbox queue items, checkpoints)
//! - Status enums with state machine transitions
//! - Regulator entity and operation vocabularies
//! - ID prefix constants
//! - Cross-cutting error types
//! - Operator-facing response types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod responses;

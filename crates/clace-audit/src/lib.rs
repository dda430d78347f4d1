// crates/clace-audit/src/lib.rs
// ============================================================================
// Module: Clace Audit Gate
// Description: Computes the permission diff a declared app needs vs. what an
//              operator has already approved (spec.md §4.2).
// Purpose: Block activation of anything beyond the last approved surface
//          until an operator signs off, without ever running user code.
// Dependencies: clace-core, regex, thiserror
// ============================================================================

//! ## Overview
//! The audit gate is pure: given a declared surface (loads + permissions)
//! and the previously approved surface, it reports whether the declared
//! surface is already covered or needs a fresh approval, and what exactly
//! is new. It never executes a handler or a plugin call; it only compares
//! the declarations the registry hands it.
//!
//! Security posture: the approved-permissions set is the trust boundary
//! between "what an app says it does" and "what an operator has signed off
//! on". This module must fail closed: any declared element without a
//! structural or regex match against the approved set flips
//! `needs_approval` to `true`.

/// Permission-diff computation: declared surface vs. approved surface.
pub mod gate;

pub use gate::AuditDecision;
pub use gate::AuditError;
pub use gate::AuditInput;
pub use gate::evaluate;

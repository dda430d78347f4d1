// crates/clace-store-sqlite/src/lib.rs
// ============================================================================
// Module: Clace SQLite Metadata Store
// Description: Durable, transactional home for apps/versions/sync/audit rows.
// Purpose: Re-export the store's public surface.
// Dependencies: rusqlite, clace-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! See [`store`] for the implementation. This crate is the only place in
//! the workspace that issues SQL.

pub mod store;

pub use store::MetadataStore;
pub use store::StoreError;
pub use store::SwitchTarget;

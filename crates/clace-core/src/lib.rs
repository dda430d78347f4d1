// crates/clace-core/src/lib.rs
// ============================================================================
// Module: Clace Core
// Description: Shared identifiers, domain rows, path-spec grammar, and error
//              kinds used by every other Clace crate.
// Purpose: Give the store, audit gate, registry, apply engine, and server a
//          single vocabulary so none of them re-derive it.
// Dependencies: serde, thiserror, data-encoding, rand, regex, time, sha2
// ============================================================================

//! ## Overview
//! `clace-core` has no I/O of its own. It defines the identifiers and row
//! shapes that flow through the metadata store and registry, the path-spec
//! grammar used by list/delete/approve selectors, and the error enum that
//! every higher crate's operations resolve into.
//!
//! Security posture: this crate only models data; it performs no
//! authorization. Callers that skip the audit gate or router invariants can
//! still misuse these types freely.

pub mod domain;
pub mod error;
pub mod ids;
pub mod pathspec;
pub mod plugin;
pub mod time;

pub use domain::AppRow;
pub use domain::AppWebhookToken;
pub use domain::AuditLogEntry;
pub use domain::AuditLogKind;
pub use domain::AuthType;
pub use domain::Metadata;
pub use domain::Perm;
pub use domain::ReloadPolicy;
pub use domain::Settings;
pub use domain::SyncEntry;
pub use domain::SyncMetadata;
pub use domain::SyncState;
pub use domain::SyncStatus;
pub use domain::VersionRow;
pub use error::ClaceError;
pub use error::ClaceResult;
pub use ids::AppId;
pub use ids::VariantKind;
pub use pathspec::PathSpec;
pub use time::Timestamp;

/// Path prefix reserved for the control API (spec.md §6.1). No app may be
/// mounted at or under this prefix.
pub const CONTROL_PREFIX: &str = "/_clace";

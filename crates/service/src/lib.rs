//! Preference store core.
//! - Bus abstraction and per-request lifecycle tracking.
//! - Authorization gate that suspends a request while the permission oracle answers.
//! - System and application property stores.
//! - Snapshot backup and restore of every application store.

pub mod errors;
pub mod reply;
pub mod bus;
pub mod lifecycle;
pub mod access;
pub mod observability;
pub mod storage;
pub mod properties;
pub mod backup;
pub mod runtime;

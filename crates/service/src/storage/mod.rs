//! Storage abstractions for the service layer
//!
//! `json_map_store` backs read-mostly maps kept as JSON files;
//! `sqlite` holds the helpers shared by every SQLite-backed store.

pub mod json_map_store;
pub mod sqlite;

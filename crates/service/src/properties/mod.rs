//! Property storage: read-only system properties and per-application stores.

pub mod app;
pub mod app_store;
pub mod system;

pub use app::AppProperties;
pub use app_store::AppStore;
pub use system::SystemProperties;

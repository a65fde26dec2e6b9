pub mod errors;
pub mod state;
pub mod idle;
pub mod dispatch;
pub mod handlers;
pub mod routes;
pub mod startup;

pub use startup::run;

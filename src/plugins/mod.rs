//! Plugins bundled with the crate.
//!
//! - [`LoggerPlugin`] traces each stage of a call.
//! - [`RoutesPlugin`] attaches methods and schemas to known routes.

mod logger;
mod routes;

pub use logger::LoggerPlugin;
pub use routes::{Route, RoutesPlugin};

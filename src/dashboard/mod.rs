//! Read-mostly HTTP view of the log: search, summary, exports and manual submit.

mod handlers;
mod server;

#[cfg(test)]
mod tests;

pub use handlers::ApiError;
pub use server::{router, DashboardServer, DashboardState};

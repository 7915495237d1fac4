pub mod config;
pub mod error;
pub mod middleware;
pub mod router;

#[cfg(test)]
mod tests;

pub use router::{create_router, AppState};

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

pub use error::ApiError;
pub use server::{router, run};
pub use state::AppState;

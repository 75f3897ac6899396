pub mod client;
pub mod forum;
pub mod memory;
mod record;
pub mod repository;

pub use repository::{DbError, Result};

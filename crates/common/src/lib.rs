//! Shared types for the Bakalari workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

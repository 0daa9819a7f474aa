//! Shared types for the climate client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

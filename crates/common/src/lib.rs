//! Common types shared by the pipeline crates and the batch runner

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

mod config;
mod error;
mod types;

pub use config::*;
pub use error::{AbortReason, Result, StrataError};
pub use types::*;

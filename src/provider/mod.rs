mod types;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "anthropic")]
mod sse;
pub mod stub;

pub use types::*;

//! Request handlers for the record endpoints.

mod pull;
mod push;

pub use pull::*;
pub use push::*;

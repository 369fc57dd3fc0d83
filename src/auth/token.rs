//! Token record model and secret wrapper.

pub mod record;
pub mod secret;

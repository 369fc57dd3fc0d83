//! Session tokens and the identity endpoints that mint them.

pub mod session;
pub mod token;

pub use session::*;
pub use token::{record::*, secret::*};

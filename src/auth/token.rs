//! Cached credential records and the secret wrapper they share.

pub mod record;
pub mod secret;

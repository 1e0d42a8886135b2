//! Identity-domain identifiers, scope sets, response payload decoders, and cache records.

pub mod claims;
pub mod id;
pub mod scope;
pub mod token;

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use token::{record::*, secret::*};

//! Authority alias resolution: the bundled catalog, network discovery, and the per-process cache.

pub mod catalog;
pub mod manager;
pub mod network;

pub use catalog::*;
pub use manager::*;
pub use network::*;

pub mod peer;
pub mod transfer;

pub use peer::*;
pub use transfer::*;

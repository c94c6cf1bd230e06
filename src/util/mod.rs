pub mod crypto;
pub mod keystream;
pub mod node_util;
pub mod parse_image;

pub use crypto::*;
pub use keystream::*;
pub use node_util::*;

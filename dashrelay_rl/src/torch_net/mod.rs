mod network;
mod dueling;

pub use network::*;
pub use dueling::*;

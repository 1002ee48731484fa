mod dash;
mod channel;
mod curriculum;
mod expert;
mod relay;

pub use dash::*;
pub use channel::*;
pub use curriculum::*;
pub use expert::*;
pub use relay::*;

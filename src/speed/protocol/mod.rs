mod constants;
mod encoding;
mod messages;
mod parsing;

pub use constants::*;
pub use messages::*;
pub use parsing::{ParseError, parse};

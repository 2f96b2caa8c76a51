pub mod dispatch;
pub mod parse;

pub use dispatch::{handle_mention, CommandRequest};
pub use parse::mention_args;

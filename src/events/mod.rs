pub mod message;

pub use message::handle_message;

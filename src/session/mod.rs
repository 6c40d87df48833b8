pub mod commands;
pub mod controller;
pub mod events;


pub use commands::{dispatch, handle_line, SessionCommand};
pub use controller::*;
pub use events::*;

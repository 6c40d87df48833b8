pub mod config;
pub mod error;
pub mod file_monitor;
pub mod media_file;
pub mod validation_cache;
pub mod validator;


pub use config::*;
pub use error::*;
pub use file_monitor::*;
pub use media_file::*;
pub use validation_cache::*;
pub use validator::*;

pub mod core;
pub mod session;
pub mod video;

#[cfg(test)]
mod test_utils;

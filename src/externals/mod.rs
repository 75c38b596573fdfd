pub mod hardware;
pub mod input;

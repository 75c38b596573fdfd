pub mod aim_request;
pub mod buttons;
pub mod command;
pub mod device;
pub mod vector;

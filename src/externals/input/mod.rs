pub mod arming;

pub mod aim_writer;
pub mod dispatch;
pub mod feature;
pub mod ports;
pub mod toggles;

#[cfg(test)]
pub mod mock;

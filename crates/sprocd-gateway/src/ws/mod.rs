pub mod connection;
pub mod dispatch;
pub mod frames;

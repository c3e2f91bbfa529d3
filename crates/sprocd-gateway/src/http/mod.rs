pub mod control;
pub mod health;

pub mod abilities;
pub mod health;

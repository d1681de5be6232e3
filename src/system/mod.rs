pub mod browser;
pub mod files;
pub mod health;

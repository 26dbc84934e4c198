pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod login;
pub mod user_store;

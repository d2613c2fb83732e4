pub mod config;
pub mod messages;
pub mod module;
pub mod motor;
pub mod runtime;

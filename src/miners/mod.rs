pub mod api;
pub mod backends;
pub mod commands;
pub mod data;
pub mod factory;

pub mod application;
pub mod commands;

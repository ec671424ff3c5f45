pub mod btle;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod radio;
pub mod registry;
pub mod reports;
pub mod status;
pub mod types;

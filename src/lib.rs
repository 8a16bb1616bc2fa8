pub mod controllers;
pub mod core;
pub mod dto;
pub mod server;
pub mod services;
pub mod utils;

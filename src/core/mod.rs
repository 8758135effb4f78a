pub mod build;
pub mod config;
pub mod job;
pub mod notification;
pub mod service;
pub mod store;
pub mod terminal;

pub mod config;
pub mod dialog;
pub mod enhancer;
pub mod error;
pub mod launcher;
pub mod models;
pub mod schemas;
pub mod server;
pub mod tools;

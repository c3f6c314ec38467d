pub mod app;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod data;
pub mod logging;
pub mod sdmx;
pub mod utils;

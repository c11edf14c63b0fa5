//! Command-line entry point for the service binary

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, run, Cli, CliOutputFormat};

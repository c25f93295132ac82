//! Device drivers - firmware text console

pub mod console;

pub use console::ConsoleLogger;

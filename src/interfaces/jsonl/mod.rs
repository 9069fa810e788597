//! Line-delimited JSON command input.

pub mod command;
pub mod command_reader;

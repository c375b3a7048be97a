//! Library half of the `kato` binary: runtime wiring and command
//! implementations, kept separate from argument parsing in `main.rs`.

pub mod commands;
pub mod output;
pub mod repl;

pub use output::OutputFormat;

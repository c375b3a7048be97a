//! Minimal output helpers. No TTY/color dependency here - this binary is a
//! smoke-test harness, not an end-user product, so plain and JSON are the
//! only two formats worth the dependency.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
}

pub fn print<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Plain => println!("{}", serde_json::to_string(data)?),
    }
    Ok(())
}

pub fn info(msg: impl std::fmt::Display) {
    println!("# {msg}");
}

pub fn error(msg: impl std::fmt::Display) {
    eprintln!("error: {msg}");
}

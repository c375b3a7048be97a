//! A one-session interactive loop over a `Processor`, for manual
//! smoke-testing: `observe`, `learn`, `predict`, and `clear` against a single
//! session kept alive for the life of the process.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use kato_core::{Emotives, Observation, SessionConfigOverrides};
use kato_engine::Processor;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(processor: &Processor, format: OutputFormat) -> Result<()> {
    let session_id = processor.create_session(SessionConfigOverrides::default()).await?;
    output::info(format!("session {session_id} ready - commands: observe <sym...> | learn | predict | clear | exit"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("kato> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();

        let result = dispatch(processor, &session_id.to_string(), cmd, &rest, format).await;
        if let Err(e) = result {
            output::error(e);
        }
        if cmd == "exit" || cmd == "quit" {
            break;
        }
    }
    Ok(())
}

async fn dispatch(
    processor: &Processor,
    session_id: &str,
    cmd: &str,
    args: &[&str],
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        "observe" => {
            let obs = Observation {
                symbols: args.iter().map(|s| s.to_string()).collect(),
                vectors: Vec::new(),
                emotives: Emotives::new(),
                metadata: None,
            };
            let (stm_len, learned) = processor.observe(session_id, obs).await?;
            output::print(&serde_json::json!({"stm_len": stm_len, "auto_learned": learned}), format)?;
        }
        "learn" => {
            let name = processor.learn(session_id).await?;
            output::print(&serde_json::json!({"learned": name}), format)?;
        }
        "predict" => {
            let predictions = processor.predict(session_id).await?;
            output::print(&predictions, format)?;
        }
        "clear" => {
            processor.clear_stm(session_id).await?;
            output::info("STM cleared");
        }
        "exit" | "quit" => {}
        other => output::error(format!("unknown command '{other}'")),
    }
    Ok(())
}

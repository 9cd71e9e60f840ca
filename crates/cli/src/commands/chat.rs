//! `finassist chat`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use finassist_agent::TurnRunner;
use finassist_config::AppConfig;
use finassist_core::artifact::Artifact;
use finassist_core::event::TurnEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

pub async fn run(
    config_path: Option<&Path>,
    thread: Option<String>,
    user: String,
    message: Option<String>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    // Fail early with a clear error when no API key is set
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    FINASSIST_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let runner = super::build_runner(&config)?;
    let thread_id = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Some(msg) = message {
        // Single message mode
        send(&runner, &thread_id, &user, &msg).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  finassist, interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.models.reasoning);
    println!("  Thread:    {thread_id}");
    println!("  User:      {user}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        if let Err(e) = send(&runner, &thread_id, &user, line).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn and print its events as they arrive.
async fn send(runner: &Arc<TurnRunner>, thread_id: &str, user: &str, message: &str) -> anyhow::Result<()> {
    let mut events = runner.stream_turn(thread_id, user, message);
    let mut stdout = std::io::stdout();
    let mut started = false;

    while let Some(event) = events.next().await {
        match event {
            TurnEvent::TextDelta { content } => {
                if !started {
                    print!("  Assistant > ");
                    started = true;
                }
                print!("{content}");
                stdout.flush()?;
            }
            TurnEvent::ToolCall { name, .. } => eprintln!("  [tool] {name}"),
            TurnEvent::ToolResult { name, success: false, .. } => eprintln!("  [tool failed] {name}"),
            TurnEvent::Artifact { artifact } => println!("\n  {}", describe_artifact(&artifact)),
            TurnEvent::Error { message } => eprintln!("  [Error] {message}"),
            TurnEvent::Done { .. } => println!(),
            TurnEvent::ToolResult { .. } | TurnEvent::StateSnapshot { .. } => {}
        }
    }
    Ok(())
}

fn describe_artifact(artifact: &Artifact) -> String {
    let kind = serde_json::to_value(artifact.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", artifact.kind));
    let rows = artifact
        .data
        .get("rows")
        .and_then(|rows| rows.as_array())
        .map(|rows| format!(", {} rows", rows.len()))
        .unwrap_or_default();
    format!("[{kind}] {}{rows}", artifact.name)
}

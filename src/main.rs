//! Memoria CLI
//!
//! Interactive chat with persistent memory. The terminal layer stays thin:
//! read a line, run the agent loop, print what comes back.

use clap::Parser;
use memoria::agent::{run_agent_loop, AgentEvent, AgentLoopOptions};
use memoria::consolidation::run_consolidation;
use memoria::llm::{ChatMessage, LlmClient};
use memoria::prompts::build_system_prompt;
use memoria::store::MemoryStore;
use memoria::tools::chat_tool_schemas;
use memoria::MemoriaConfig;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Memoria - a local assistant that remembers you
#[derive(Parser, Debug)]
#[command(name = "memoria")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the markdown vault (overrides MEMORIA_VAULT and config.toml)
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Base URL of the chat completions endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Delete all user memory (the soul survives) and start fresh
    #[arg(long)]
    reset_memory: bool,

    /// Reset the soul files to their seed defaults
    #[arg(long)]
    reset_soul: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Optional `~/.config/memoria/config.toml`.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    vault_path: Option<PathBuf>,
    base_url: Option<String>,
    model: Option<String>,
}

fn load_config_file() -> ConfigToml {
    let Some(config_dir) = dirs::config_dir() else {
        return ConfigToml::default();
    };
    let path = config_dir.join("memoria").join("config.toml");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return ConfigToml::default();
    };
    match toml::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Ignoring malformed {}: {}", path.display(), e);
            ConfigToml::default()
        }
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<MemoriaConfig> {
    let file = load_config_file();

    let vault = cli
        .vault
        .clone()
        .or_else(|| std::env::var("MEMORIA_VAULT").ok().map(PathBuf::from))
        .or(file.vault_path)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no vault configured - pass --vault, set MEMORIA_VAULT, or add vault_path to config.toml"
            )
        })?;

    let mut config = MemoriaConfig::new(vault);
    if let Some(base_url) = cli.base_url.clone().or(file.base_url) {
        config = config.with_base_url(base_url);
    }
    if let Some(model) = cli.model.clone().or(file.model) {
        config = config.with_model(model);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = resolve_config(&cli)?;
    let store = MemoryStore::new(&config);
    let llm = LlmClient::new(&config);

    if cli.reset_memory {
        if !confirm("Delete existing memory and start fresh?").await {
            println!("Cancelled.");
            return Ok(());
        }
        store.forget_user().await?;
        store.ensure_structure().await?;
        println!("Memory deleted. The soul was preserved.");
        return Ok(());
    }

    if cli.reset_soul {
        if !confirm("Reset soul files to their defaults?").await {
            println!("Cancelled.");
            return Ok(());
        }
        store.reset_soul().await?;
        println!("Soul reset.");
        return Ok(());
    }

    if let Err(e) = store.ensure_structure().await {
        eprintln!("Memory init warning: {}", e);
    }

    run_chat(&store, &llm).await;
    Ok(())
}

async fn confirm(question: &str) -> bool {
    print!("{} [yes/no] ", question);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    if reader.read_line(&mut line).await.is_err() {
        return false;
    }
    line.trim().eq_ignore_ascii_case("yes")
}

/// System message content: behavioral prompt plus current core memory.
async fn build_system_content(store: &MemoryStore) -> String {
    let base = build_system_prompt(store).await.unwrap_or_else(|e| {
        warn!("Could not build system prompt: {}", e);
        String::new()
    });
    let core = store.read_core_memory().await.unwrap_or_default();
    if core.is_empty() {
        format!(
            "{}\n\n## Core memory (current)\n\n(Empty. Use update_core_memory when you learn something about the user.)",
            base
        )
    } else {
        format!("{}\n\n## Core memory (current)\n\n{}", base, core)
    }
}

/// Print agent events as they arrive. Returns when the channel closes.
async fn print_events(mut rx: mpsc::Receiver<AgentEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ContentDelta(delta) => {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
            AgentEvent::ToolCallStarted { name, .. } => {
                println!("\n  [{}...]", name);
            }
            AgentEvent::ToolCallCompleted { result, .. } => {
                let mut preview: String = result.chars().take(200).collect();
                if result.chars().count() > 200 {
                    preview.push_str("...");
                }
                println!("  {}", preview);
            }
            AgentEvent::FinalResponse(text) => {
                println!("{}", text);
            }
        }
    }
}

async fn run_chat(store: &MemoryStore, llm: &LlmClient) {
    println!("Memoria. Type 'quit' to end the session (and consolidate memory).\n");

    let tools = chat_tool_schemas();
    let mut messages = vec![ChatMessage::system(build_system_content(store).await)];
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut first_turn = true;

    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim().to_string();

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("\nconsolidating...");
            let (tx, rx) = mpsc::channel(64);
            let printer = tokio::spawn(print_events(rx));
            let report = run_consolidation(store, llm, &messages, Some(tx)).await;
            let _ = printer.await;
            if report.hit_iteration_cap {
                println!("consolidation hit max iterations - memory may be partially updated");
            }
            if let Some(outcome) = report.observations {
                println!("observations consolidated ({} entries kept)", outcome.entries_kept);
            }
            println!("Goodbye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        // On the first turn, carry core memory inside the user message too,
        // in case the backend rewrites the system prompt when tools are
        // attached.
        let user_content = if first_turn {
            let core = store.read_core_memory().await.unwrap_or_default();
            first_turn = false;
            if core.is_empty() {
                input
            } else {
                format!(
                    "## Core memory (current)\n\n{}\n\n---\n\nUser request: {}",
                    core, input
                )
            }
        } else {
            input
        };
        messages.push(ChatMessage::user(user_content));

        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_events(rx));
        let loop_future = run_agent_loop(
            llm,
            store,
            messages.clone(),
            &tools,
            AgentLoopOptions::chat(),
            Some(tx),
        );

        // Coarse cancellation: Ctrl-C aborts the current turn, not the session.
        tokio::select! {
            outcome = loop_future => {
                let _ = printer.await;
                if outcome.final_response.is_empty() && outcome.iterations <= 1 {
                    println!("(no response)");
                }
                messages = outcome.messages;
            }
            _ = tokio::signal::ctrl_c() => {
                printer.abort();
                messages.pop();
                println!("\n(interrupted)");
            }
        }
        println!();

        // Keep core memory current in the system message after tool updates
        messages[0] = ChatMessage::system(build_system_content(store).await);
    }
}

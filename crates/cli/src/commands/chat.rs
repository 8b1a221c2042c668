//! `a2ia chat`: interactive or single-message conversation.

use std::io::Write;
use std::sync::Arc;

use a2ia_agent::{AgentStreamEvent, Orchestrator};
use a2ia_config::{AppConfig, OrchestratorMode};
use a2ia_core::Role;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::workspace;

pub struct ChatOptions {
    pub message: Option<String>,
    pub react: bool,
    pub no_stream: bool,
    pub no_tools: bool,
    pub max_iterations: Option<usize>,
}

/// How each turn is run.
#[derive(Debug, Clone, Copy)]
struct TurnSettings {
    mode: OrchestratorMode,
    stream: bool,
    max_iterations: usize,
}

pub async fn run(opts: ChatOptions) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let workspace = Arc::new(workspace::open(&config.workspace)?);
    let registry = a2ia_tools::default_registry(workspace.clone(), &config.tools)?;
    let provider = a2ia_providers::build_from_config(&config)?;

    let settings = TurnSettings {
        mode: if opts.react {
            OrchestratorMode::React
        } else {
            config.orchestrator.mode
        },
        stream: config.orchestrator.stream && !opts.no_stream,
        max_iterations: opts
            .max_iterations
            .unwrap_or(config.orchestrator.max_iterations),
    };

    let mut orchestrator = Orchestrator::new(provider, Arc::new(registry), &config.provider.model)
        .with_temperature(config.provider.temperature)
        .with_tools_enabled(config.orchestrator.enable_tools && !opts.no_tools);
    if let Some(max_tokens) = config.provider.max_tokens {
        orchestrator = orchestrator.with_max_tokens(max_tokens);
    }

    if let Some(message) = opts.message {
        orchestrator.add_message(Role::User, message);
        return run_turn(&mut orchestrator, settings).await;
    }

    println!();
    println!("  A2IA interactive mode");
    println!("  Provider:   {}", config.provider.name);
    println!("  Model:      {}", config.provider.model);
    println!("  Mode:       {:?}", settings.mode);
    println!("  Workspace:  {}", workspace.root().display());
    println!("  Tools:      {}", orchestrator.tool_definitions().len());
    println!();
    println!("  Type 'exit' to quit, '/clear' to reset the conversation.");
    println!("  Ctrl+C cancels the current turn.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                orchestrator.clear_history();
                println!("  (history cleared)");
                continue;
            }
            _ => {}
        }

        orchestrator.add_message(Role::User, input);
        if let Err(e) = run_turn(&mut orchestrator, settings).await {
            eprintln!("  [Error] {e:#}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Run one turn, rendering events as they arrive. Ctrl+C drops the turn
/// future, which cancels the provider stream and any running subprocess.
async fn run_turn(orchestrator: &mut Orchestrator, settings: TurnSettings) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(256);
    let renderer = tokio::spawn(render_events(rx));

    let outcome = {
        let turn = async {
            match (settings.mode, settings.stream) {
                (OrchestratorMode::React, _) => {
                    orchestrator
                        .process_turn_react_streaming(settings.max_iterations, &tx)
                        .await
                }
                (OrchestratorMode::Native, true) => {
                    orchestrator
                        .process_turn_streaming(settings.max_iterations, &tx)
                        .await
                }
                (OrchestratorMode::Native, false) => {
                    orchestrator.process_turn(settings.max_iterations).await
                }
            }
        };
        tokio::select! {
            result = turn => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };
    drop(tx);
    renderer.await.context("Event renderer failed")?;

    match outcome {
        None => {
            eprintln!();
            eprintln!("  [cancelled]");
            Ok(())
        }
        Some(Ok(message)) => {
            if settings.mode == OrchestratorMode::Native && !settings.stream {
                println!("{}", message.content);
            }
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
    }
}

async fn render_events(mut rx: mpsc::Receiver<AgentStreamEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(line) = render(&event) else { continue };
        match line {
            Rendered::Inline(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            Rendered::Line(text) => println!("{text}"),
            Rendered::Status(text) => eprintln!("{text}"),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Rendered {
    /// Streamed text, printed without a newline.
    Inline(String),
    Line(String),
    /// Progress and diagnostics on stderr.
    Status(String),
}

fn render(event: &AgentStreamEvent) -> Option<Rendered> {
    let rendered = match event {
        AgentStreamEvent::Content { content } => Rendered::Inline(content.clone()),
        AgentStreamEvent::Thought { content } => Rendered::Status(format!("  . {content}")),
        AgentStreamEvent::ToolCall {
            name, arguments, ..
        } => Rendered::Status(format!("\n  -> {name} {arguments}")),
        AgentStreamEvent::ActionStart { .. } => return None,
        AgentStreamEvent::ToolResult { name, success, .. } => {
            if *success {
                Rendered::Status(format!("  <- {name} ok"))
            } else {
                Rendered::Status(format!("  <- {name} reported failure"))
            }
        }
        AgentStreamEvent::ToolError { name, error, .. } => {
            Rendered::Status(format!("  !! {name}: {error}"))
        }
        AgentStreamEvent::Warning { tool, message } => {
            Rendered::Status(format!("  warning ({tool}): {message}"))
        }
        AgentStreamEvent::FinalAnswer { content } => Rendered::Line(content.clone()),
        AgentStreamEvent::Done { .. } => Rendered::Inline("\n".into()),
        AgentStreamEvent::Error { message } => Rendered::Status(format!("  [Error] {message}")),
    };
    Some(rendered)
}

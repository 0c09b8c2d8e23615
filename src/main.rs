use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use toolpilot::domain::{ConversationTurn, LoopSession, SessionStatus};
use toolpilot::gateway::{Credential, Gateway, ToolGateway};
use toolpilot::ipc::{GatewayClient, GatewayClientConfig, GatewayServer, GatewayServerConfig};
use toolpilot::manager::SessionManager;
use toolpilot::planner::AnthropicPlanner;
use toolpilot::tools::builtin::{stock_handler, stock_tools};
use toolpilot::tools::{ToolCatalog, ToolDescriptor};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

type Manager = SessionManager<AnthropicPlanner, GatewayClient>;

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolpilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("toolpilot.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(log_level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_chat_command(None, cli.is_verbose(), config).await,
        Some(Commands::Serve { catalog, workdir }) => {
            handle_serve_command(catalog.as_deref(), workdir.as_deref(), config).await
        }
        Some(Commands::Tools) => handle_tools_command(config).await,
        Some(Commands::Run {
            task,
            max_iterations,
            transcript,
        }) => handle_run_command(task, *max_iterations, transcript.as_deref(), cli.is_verbose(), config).await,
        Some(Commands::Chat { max_iterations }) => {
            handle_chat_command(*max_iterations, cli.is_verbose(), config).await
        }
    }
}

fn build_gateway(catalog_path: Option<&Path>, workdir: &Path, config: &Config) -> Result<Gateway> {
    let credential = Credential::from_env(&config.gateway.credential_env).context("Failed to read gateway credential")?;
    let mut builder = Gateway::builder()
        .credential(credential)
        .default_timeout(config.tool_timeout());

    match catalog_path {
        Some(path) => {
            let catalog = ToolCatalog::from_file(path).context(format!("Failed to load catalog {}", path.display()))?;
            for name in catalog.names() {
                let handler = stock_handler(name, workdir)
                    .ok_or_else(|| eyre!("Catalog tool '{}' has no built-in handler", name))?;
                builder = builder.handler(name, handler);
            }
            builder = builder.catalog(catalog);
        }
        None => {
            for (descriptor, handler) in stock_tools(workdir) {
                builder = builder.tool(descriptor, handler);
            }
        }
    }

    Ok(builder.build()?)
}

async fn handle_serve_command(catalog: Option<&Path>, workdir: Option<&Path>, config: &Config) -> Result<()> {
    let workdir = match workdir {
        Some(dir) => dir.to_path_buf(),
        None => config.workdir()?,
    };
    let catalog = catalog.map(Path::to_path_buf).or_else(|| config.gateway.catalog_path.clone());
    let gateway = build_gateway(catalog.as_deref(), &workdir, config)?;

    let server_config = GatewayServerConfig::default()
        .with_socket_path(config.socket_path())
        .with_max_clients(config.gateway.max_clients);
    let server = GatewayServer::new(gateway, server_config);

    println!(
        "{} {} (workdir {})",
        "Gateway listening on".green(),
        server.socket_path().display(),
        workdir.display()
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down gateway");
            trigger.cancel();
        }
    });

    server.run(shutdown).await.context("Gateway server failed")?;
    println!("{}", "Gateway stopped".cyan());
    Ok(())
}

async fn connect(config: &Config) -> Result<GatewayClient> {
    let secret = config.credential_secret()?;
    let client_config = GatewayClientConfig::with_socket(config.socket_path());
    let client = GatewayClient::connect(client_config, &secret)
        .await
        .context("Failed to connect to gateway (is `toolpilot serve` running?)")?;
    Ok(client)
}

async fn handle_tools_command(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    print_tools(&client.list_tools().await);
    Ok(())
}

fn build_manager(client: GatewayClient, config: &Config) -> Result<Manager> {
    let planner = AnthropicPlanner::new(config.anthropic_config()).context("Failed to create planner")?;
    Ok(SessionManager::new(
        Arc::new(planner),
        Arc::new(client),
        config.runner_config(),
    ))
}

/// Run one task; Ctrl-C cancels the session instead of killing the process
async fn run_task(manager: &Manager, task: &str, max_iterations: u32) -> Result<LoopSession> {
    let handle = manager.start_session(task, max_iterations).await;

    let finished = tokio::select! {
        finished = manager.wait(&handle) => finished,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Cancelling...".yellow());
            manager.cancel(&handle).await;
            manager.wait(&handle).await
        }
    };
    let finished = finished.ok_or_else(|| eyre!("Session {} disappeared", handle))?;
    manager.remove(&handle).await;
    Ok(finished)
}

async fn handle_run_command(
    task: &str,
    max_iterations: Option<u32>,
    transcript: Option<&Path>,
    verbose: bool,
    config: &Config,
) -> Result<()> {
    let client = connect(config).await?;
    let manager = build_manager(client, config)?;
    let max_iterations = max_iterations.unwrap_or(config.session.max_iterations);

    let session = run_task(&manager, task, max_iterations).await?;
    print_session(&session, verbose);

    if let Some(path) = transcript {
        let json = serde_json::to_string_pretty(&session)?;
        fs::write(path, json).context(format!("Failed to write transcript {}", path.display()))?;
        println!("{} {}", "Transcript written to".dimmed(), path.display());
    }
    Ok(())
}

async fn handle_chat_command(max_iterations: Option<u32>, verbose: bool, config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let tools = client.list_tools().await;
    let manager = build_manager(client, config)?;
    let max_iterations = max_iterations.unwrap_or(config.session.max_iterations);

    println!(
        "{} {} tools available. Type 'tools' to list them, 'exit' to quit.",
        "Connected.".green(),
        tools.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = next_prompt_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "tools" => print_tools(&tools),
            task => {
                let session = run_task(&manager, task, max_iterations).await?;
                print_session(&session, verbose);
            }
        }
    }

    println!("{}", "Goodbye.".dimmed());
    Ok(())
}

/// Read the next REPL line; `None` on end of input or interrupt
///
/// The first session installs a SIGINT handler for the rest of the process,
/// so the idle prompt has to watch for Ctrl-C itself.
async fn next_prompt_line<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

fn print_tools(tools: &[ToolDescriptor]) {
    for tool in tools {
        println!("{} - {}", tool.name.green().bold(), tool.description);
        for param in &tool.input_schema.params {
            let required = if param.required { "required" } else { "optional" };
            println!(
                "    {} ({}, {}) {}",
                param.name,
                param.kind.name(),
                required,
                param.description.as_deref().unwrap_or("")
            );
        }
    }
}

fn format_timestamp(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_session(session: &LoopSession, verbose: bool) {
    if verbose {
        println!(
            "{} {} started {}",
            "Session".dimmed(),
            session.id.cyan(),
            format_timestamp(session.created_at)
        );
        for turn in session.conversation.turns() {
            match turn {
                ConversationTurn::Planner(p) => {
                    for inv in &p.invocations {
                        println!("{} {} {}", "->".dimmed(), inv.tool_name.cyan(), serde_json::Value::Object(inv.arguments.clone()));
                    }
                }
                ConversationTurn::ToolResults(r) => {
                    for result in &r.results {
                        let marker = if result.is_success() { "<-".green() } else { "<-".red() };
                        println!("{} {}", marker, result.content_text());
                    }
                }
            }
        }
    }

    let mut summary = format!(
        "[{} after {} iteration(s), {} tool call(s)",
        session.status.label(),
        session.iteration_count,
        session.dispatch_count
    );
    if let Some(ms) = session.duration_ms() {
        summary.push_str(&format!(", {}ms", ms));
    }
    summary.push(']');
    match &session.status {
        SessionStatus::CompletedWithAnswer(answer) => {
            println!("{}", answer);
            println!("{}", summary.dimmed());
        }
        SessionStatus::StoppedAtBound => {
            println!("{} {}", "Stopped at the iteration bound.".yellow(), summary.dimmed());
        }
        SessionStatus::Failed(reason) => {
            println!("{} {} {}", "Failed:".red().bold(), reason, summary.dimmed());
        }
        SessionStatus::Running => println!("{}", summary),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prompt_reads_lines_until_eof() {
        let mut lines = BufReader::new(&b"list files\nquit\n"[..]).lines();
        let never = std::future::pending::<()>;

        assert_eq!(next_prompt_line(&mut lines, never()).await.unwrap().as_deref(), Some("list files"));
        assert_eq!(next_prompt_line(&mut lines, never()).await.unwrap().as_deref(), Some("quit"));
        assert_eq!(next_prompt_line(&mut lines, never()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prompt_interrupt_ends_input() {
        // Stdin that never produces a line
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let line = next_prompt_line(&mut lines, std::future::ready(())).await.unwrap();
        assert_eq!(line, None);
    }
}

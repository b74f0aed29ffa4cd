mod doctor;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conduit_a2a::{A2aClient, CardRegistry};
use conduit_core::config::AppConfig;
use conduit_core::protocol::StreamResponse;
use conduit_core::traits::AgentResolver;
use conduit_gateway::GatewayServer;
use conduit_mcp::McpAgentResolver;
use conduit_workflow::{GraphState, OrchestratorAgent, WorkflowChunk};

#[derive(Parser)]
#[command(name = "conduit", version, about = "A2A workflow orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conduit.toml")]
    config: PathBuf,

    /// Session (context) ID, auto-generated if not provided
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session: answer follow-up questions until the plan completes
    Repl,
    /// Run a single query, prompting for answers while the workflow is paused
    Run {
        /// The query for the orchestrator
        #[arg(trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Serve the orchestrator as an A2A agent
    Serve,
    /// Fetch and print a remote agent's card
    Card {
        /// Base URL of the agent
        url: String,
    },
    /// Show current configuration
    Config,
    /// Check configuration and reachability of remote agents
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// The resolver in use, kept concrete so it can be shut down cleanly.
enum Discovery {
    Mcp(Arc<McpAgentResolver>),
    Static(Arc<CardRegistry>),
}

impl Discovery {
    async fn connect(config: &AppConfig, client: &A2aClient) -> anyhow::Result<Self> {
        config.discovery.validate()?;
        match &config.discovery.mcp {
            Some(mcp) => {
                info!("Connecting to MCP agent registry");
                Ok(Self::Mcp(Arc::new(McpAgentResolver::connect(mcp).await?)))
            }
            None => {
                info!(agents = config.discovery.agents.len(), "Fetching agent cards");
                let registry = CardRegistry::discover(&config.discovery, client).await?;
                Ok(Self::Static(Arc::new(registry)))
            }
        }
    }

    fn resolver(&self) -> Arc<dyn AgentResolver> {
        match self {
            Self::Mcp(r) => r.clone() as Arc<dyn AgentResolver>,
            Self::Static(r) => r.clone(),
        }
    }

    async fn shutdown(&self) {
        if let Self::Mcp(r) = self {
            r.shutdown().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conduit=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "conduit", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };
    let client = A2aClient::from_config(&config.client)?;

    match &cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Some(Commands::Card { url }) => {
            let card = client.fetch_agent_card(url).await?;
            println!("{}", serde_json::to_string_pretty(&card)?);
            return Ok(());
        }
        Some(Commands::Doctor) => {
            doctor::run_doctor(&config, &client).await;
            return Ok(());
        }
        _ => {}
    }

    let discovery = Discovery::connect(&config, &client).await?;
    let orchestrator = Arc::new(OrchestratorAgent::new(discovery.resolver(), Arc::new(client)));
    let session_id = cli
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match cli.command {
        Some(Commands::Serve) => {
            let gateway_config = config.gateway.clone().unwrap_or_default();
            let card = config.orchestrator.agent_card();
            info!(bind = %gateway_config.bind, "Starting A2A gateway");
            let server = GatewayServer::new(gateway_config, card, orchestrator);
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Some(Commands::Run { query }) => {
            let text = query.join(" ");
            let text = if text.is_empty() {
                // Read from stdin
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text
            };
            let mut state = run_once(&orchestrator, &session_id, &text).await?;
            // Answer follow-up questions until the workflow stops pausing
            while state == GraphState::Paused {
                print!("> ");
                io::stdout().flush()?;
                let mut answer = String::new();
                if io::stdin().lock().read_line(&mut answer)? == 0 {
                    break; // EOF
                }
                if answer.trim().is_empty() {
                    continue;
                }
                state = run_once(&orchestrator, &session_id, answer.trim()).await?;
            }
        }
        Some(Commands::Repl) | None => {
            run_repl(&orchestrator, &session_id).await?;
        }
        Some(Commands::Config | Commands::Card { .. } | Commands::Doctor | Commands::Completions { .. }) => {
            unreachable!("handled before discovery")
        }
    }

    discovery.shutdown().await;
    Ok(())
}

async fn run_once(orchestrator: &OrchestratorAgent, session_id: &str, input: &str) -> anyhow::Result<GraphState> {
    let state = orchestrator.stream(input, session_id, print_chunk).await?;
    Ok(state)
}

fn print_chunk(chunk: WorkflowChunk) {
    let node = &chunk.node_id[..chunk.node_id.len().min(8)];
    match &chunk.response {
        StreamResponse::StatusUpdate(ev) => {
            let text = chunk.response.text().unwrap_or_default();
            if chunk.response.is_input_required() {
                println!("[{}] ? {}", node, text);
            } else if !text.is_empty() {
                println!("[{}] {}: {}", node, ev.status.state, text);
            } else {
                println!("[{}] {}", node, ev.status.state);
            }
        }
        _ => {
            if let Some(text) = chunk.response.text() {
                println!("[{}] {}", node, text);
            }
        }
    }
    io::stdout().flush().ok();
}

async fn run_repl(orchestrator: &OrchestratorAgent, session_id: &str) -> anyhow::Result<()> {
    println!("Conduit v{}", env!("CARGO_PKG_VERSION"));
    println!("Session: {}", session_id);
    println!("Type /quit to exit, /reset to start over.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/reset" => {
                orchestrator.reset(session_id).await;
                println!("Session reset.");
                continue;
            }
            "/status" => {
                match orchestrator.session_state(session_id).await {
                    Some(state) => println!("Workflow: {}", state),
                    None => println!("Workflow: idle"),
                }
                continue;
            }
            _ => {}
        }

        match run_once(orchestrator, session_id, input).await {
            Ok(GraphState::Paused) => println!(),
            Ok(state) => println!("\nWorkflow {}.\n", state.to_string().to_lowercase()),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

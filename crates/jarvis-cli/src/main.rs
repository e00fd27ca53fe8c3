use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jarvis_contracts::capabilities::CapabilityRegistry;
use jarvis_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use jarvis_contracts::config::RouterConfig;
use jarvis_contracts::events::EventWriter;
use jarvis_contracts::session::{
    new_session_id, now_utc_iso, write_session_summary, SessionSummary,
};
use jarvis_engine::{
    default_executor_registry, ClassifierGateway, DryrunGateway, OpenAiGateway,
    OrchestrationMachine, Router, TaskSplitter,
};
use serde_json::{json, Map, Value};

#[derive(Debug, Parser)]
#[command(name = "jarvis-rs", version, about = "Jarvis intent routing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Route(RouteArgs),
    Split(SplitArgs),
    Ask(AskArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct GatewayArgs {
    /// Classifier gateway: "dryrun" (offline) or "openai".
    #[arg(long, default_value = "dryrun")]
    gateway: String,
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    request_limit: Option<f64>,
    #[arg(long)]
    request_window_seconds: Option<f64>,
    #[arg(long)]
    max_input_length: Option<f64>,
    #[arg(long)]
    classify_retry_attempts: Option<f64>,
    #[arg(long)]
    classify_retry_delay_seconds: Option<f64>,
    #[arg(long)]
    request_timeout_seconds: Option<f64>,
}

#[derive(Debug, Parser)]
struct RouteArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct SplitArgs {
    #[arg(long)]
    text: String,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    image: Vec<PathBuf>,
    #[arg(long)]
    audio: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    gateway: GatewayArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("jarvis-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Route(args) => run_route(args),
        Command::Split(args) => run_split(args),
        Command::Ask(args) => run_ask(args),
        Command::Chat(args) => run_chat(args),
    }
}

fn run_route(args: RouteArgs) -> Result<i32> {
    let registry = CapabilityRegistry::new(None);
    let config = router_config(&args.gateway);
    let gateway = build_gateway(&args.gateway, &registry, &config)?;
    let events = args
        .events
        .map(|path| EventWriter::new(path, new_session_id()));
    let router = Router::new(config, registry, gateway, events);
    let decision = router.route(&args.text)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(0)
}

fn run_split(args: SplitArgs) -> Result<i32> {
    let registry = CapabilityRegistry::new(None);
    let config = router_config(&args.gateway);
    let gateway = build_gateway(&args.gateway, &registry, &config)?;
    let splitter = TaskSplitter::new(gateway);
    let tasks = splitter.split(&args.text);
    println!("{}", serde_json::to_string_pretty(&json!({ "tasks": tasks }))?);
    Ok(0)
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let registry = CapabilityRegistry::new(None);
    let config = router_config(&args.gateway);
    let gateway = build_gateway(&args.gateway, &registry, &config)?;
    let events = args
        .events
        .map(|path| EventWriter::new(path, new_session_id()));
    let router = Arc::new(Router::new(
        config,
        registry.clone(),
        Arc::clone(&gateway),
        events.clone(),
    ));
    let executors = Arc::new(default_executor_registry(&registry));
    let machine = OrchestrationMachine::new(router, TaskSplitter::new(gateway), executors, events);
    let outcome = machine.run(&args.text, &args.image, args.audio.as_deref());
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(0)
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let out_dir = args.out;
    std::fs::create_dir_all(&out_dir)?;
    let session_id = new_session_id();
    let events = EventWriter::new(out_dir.join("events.jsonl"), session_id.clone());
    let started_at = now_utc_iso();

    let registry = CapabilityRegistry::new(None);
    let config = router_config(&args.gateway);
    let gateway = build_gateway(&args.gateway, &registry, &config)?;
    let router = Arc::new(Router::new(
        config,
        registry.clone(),
        Arc::clone(&gateway),
        Some(events.clone()),
    ));
    let splitter = TaskSplitter::new(Arc::clone(&gateway));
    let executors = Arc::new(default_executor_registry(&registry));
    let machine = OrchestrationMachine::new(
        Arc::clone(&router),
        TaskSplitter::new(gateway),
        executors,
        Some(events.clone()),
    );

    let mut image_attachments: Vec<PathBuf> = Vec::new();
    let mut audio_attachment: Option<PathBuf> = None;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("jarvis> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let intent = parse_intent(&line);
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => {
                println!("commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "show_stats" => {
                println!("{}", serde_json::to_string_pretty(&router.metrics())?);
            }
            "list_capabilities" => {
                for capability in registry.list() {
                    println!("{}: {}", capability.name, capability.description);
                }
            }
            "clear_attachments" => {
                image_attachments.clear();
                audio_attachment = None;
                println!("attachments cleared");
            }
            "attach_image" => match command_path(&intent.command_args) {
                Some(path) => {
                    println!("attached {}", path.display());
                    image_attachments.push(path);
                }
                None => println!("usage: /attach <path>"),
            },
            "attach_audio" => match command_path(&intent.command_args) {
                Some(path) => {
                    println!("listening to {}", path.display());
                    audio_attachment = Some(path);
                }
                None => println!("usage: /listen <path>"),
            },
            "split_tasks" => {
                let text = intent
                    .command_args
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if text.is_empty() {
                    println!("usage: /split <text>");
                    continue;
                }
                let tasks = splitter.split(text);
                println!("{}", serde_json::to_string_pretty(&json!({ "tasks": tasks }))?);
            }
            "converse" => {
                let Some(prompt) = intent.prompt.as_deref() else {
                    continue;
                };
                let outcome =
                    machine.run(prompt, &image_attachments, audio_attachment.as_deref());
                println!("{}", outcome.merged_response);
            }
            _ => println!("unknown command; try /help"),
        }
    }

    let metrics = router.metrics();
    let summary = SessionSummary {
        session_id,
        started_at,
        finished_at: now_utc_iso(),
        total_requests: metrics.total_requests,
        errors: metrics.errors,
        cache_hits: metrics.cache_hits,
        per_capability: metrics.per_capability.clone(),
    };
    write_session_summary(&out_dir.join("summary.json"), &summary, None)?;
    Ok(0)
}

fn command_path(command_args: &std::collections::BTreeMap<String, Value>) -> Option<PathBuf> {
    command_args
        .get("path")
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

fn router_config(args: &GatewayArgs) -> RouterConfig {
    let mut overrides = Map::new();
    set_override(&mut overrides, "request_limit", args.request_limit);
    set_override(
        &mut overrides,
        "request_window_seconds",
        args.request_window_seconds,
    );
    set_override(&mut overrides, "max_input_length", args.max_input_length);
    set_override(
        &mut overrides,
        "classify_retry_attempts",
        args.classify_retry_attempts,
    );
    set_override(
        &mut overrides,
        "classify_retry_delay_seconds",
        args.classify_retry_delay_seconds,
    );
    set_override(
        &mut overrides,
        "request_timeout_seconds",
        args.request_timeout_seconds,
    );
    RouterConfig::from_overrides(&overrides)
}

fn set_override(overrides: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        overrides.insert(key.to_string(), json!(value));
    }
}

fn build_gateway(
    args: &GatewayArgs,
    registry: &CapabilityRegistry,
    config: &RouterConfig,
) -> Result<Arc<dyn ClassifierGateway>> {
    match args.gateway.as_str() {
        "dryrun" => Ok(Arc::new(DryrunGateway::new(registry.clone()))),
        "openai" => Ok(Arc::new(OpenAiGateway::from_env(
            args.base_url.clone(),
            args.model.clone(),
            config.request_timeout,
        )?)),
        other => bail!("unknown gateway '{other}' (expected 'dryrun' or 'openai')"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{router_config, Cli, Command};

    #[test]
    fn cli_parses_route_command() {
        let cli = Cli::try_parse_from([
            "jarvis-rs",
            "route",
            "--text",
            "what is the temperature",
            "--request-limit",
            "5",
        ])
        .expect("parse");
        let Command::Route(args) = cli.command else {
            panic!("expected route command");
        };
        assert_eq!(args.text, "what is the temperature");
        assert_eq!(args.gateway.request_limit, Some(5.0));
    }

    #[test]
    fn cli_parses_ask_with_images() {
        let cli = Cli::try_parse_from([
            "jarvis-rs",
            "ask",
            "--text",
            "what is this",
            "--image",
            "a.png",
            "--image",
            "b.png",
        ])
        .expect("parse");
        let Command::Ask(args) = cli.command else {
            panic!("expected ask command");
        };
        assert_eq!(args.image.len(), 2);
    }

    #[test]
    fn flag_overrides_reach_router_config() {
        let cli = Cli::try_parse_from([
            "jarvis-rs",
            "route",
            "--text",
            "x",
            "--request-limit",
            "4",
            "--request-window-seconds",
            "120",
        ])
        .expect("parse");
        let Command::Route(args) = cli.command else {
            panic!("expected route command");
        };
        let config = router_config(&args.gateway);
        assert_eq!(config.request_limit, 4);
        assert_eq!(config.request_window.as_secs(), 120);
    }
}

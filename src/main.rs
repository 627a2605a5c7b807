//! Wedding concierge entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Validate config, build the system prompt
//!   6. Build LLM provider, tools, orchestrator, voice pipeline, router
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run comms channels until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wedding_bot::config::{self, Config};
use wedding_bot::error::AppError;
use wedding_bot::llm::providers;
use wedding_bot::logger;
use wedding_bot::subsystems::agents::{Orchestrator, prompt};
use wedding_bot::subsystems::comms::{self, Router};
use wedding_bot::subsystems::tools::ToolExecutor;
use wedding_bot::subsystems::voice::VoicePipeline;

const LOG_LEVEL_ENV: &str = "WEDDING_BOT_LOG_LEVEL";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present: ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    if args.interactive {
        config.comms.pty.enabled = true;
        // Local console runs don't need Meta credentials.
        if config.comms.whatsapp.enabled && config.secrets.whatsapp_access_token.is_none() {
            config.comms.whatsapp.enabled = false;
        }
    }

    let env_level = std::env::var(LOG_LEVEL_ENV).ok();
    let (effective_log_level, force_cli_level) =
        logger::effective_level(args.log_level, env_level.as_deref(), &config.log_level);
    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    config.validate()?;

    let search_enabled = config.search_enabled();
    if config.tools.web_search.enabled && !search_enabled {
        warn!("SERPER_API_KEY is not set, web search disabled");
    }
    let system_prompt = prompt::system_prompt(&config.concierge.prompts_dir, search_enabled)?;
    info!(chars = system_prompt.chars().count(), search_enabled, "system prompt ready");

    let llm = providers::build(&config.llm, config.secrets.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let tools = ToolExecutor::from_config(&config)?;
    let orchestrator = Arc::new(Orchestrator::new(
        llm,
        tools,
        system_prompt,
        config.concierge.max_history_pairs,
        config.concierge.max_tool_rounds,
    ));
    let voice = VoicePipeline::from_config(&config)?;

    match orchestrator.llm_ping().await {
        Ok(()) => info!(model = %orchestrator.model(), "llm reachable"),
        Err(e) => warn!(model = %orchestrator.model(), error = %e, "llm ping failed, continuing"),
    }

    let router = Arc::new(Router::new(orchestrator, voice));

    // Shared shutdown token: Ctrl-C cancels it, all channels watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(&config, search_enabled, args.interactive);

    let channels = comms::start(&config, router, shutdown.clone())?;
    channels.join().await?;

    // Channels may end on EOF rather than Ctrl-C.
    shutdown.cancel();

    use std::io::Write as _;
    if args.interactive {
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }
    let _ = std::io::stderr().flush();

    Ok(())
}

fn print_startup_summary(config: &Config, search_enabled: bool, interactive: bool) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        if text.chars().count() >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let mode_text = if interactive { "interactive" } else { "daemon" };
    let llm_line = format!(
        "provider={} model={} temp={} timeout={}s",
        config.llm.provider,
        config.llm.openai.model,
        config.llm.openai.temperature,
        config.llm.openai.timeout_seconds
    );
    let memory_line = format!(
        "history={} pairs, tool rounds={}",
        config.concierge.max_history_pairs, config.concierge.max_tool_rounds
    );
    let search_line = if search_enabled {
        format!("web_search: {} ({}/{})", config.tools.web_search.provider, config.tools.web_search.locale, config.tools.web_search.language)
    } else {
        "web_search: disabled".to_string()
    };
    let voice_line = format!("voice: {}", config.voice.provider);

    let mut comms_lines = Vec::new();
    comms_lines.push(format!("⌨️  pty: {}", if config.comms.pty.enabled { "enabled" } else { "disabled" }));
    if config.comms.whatsapp.enabled {
        comms_lines.push(format!("💬 whatsapp: {}", config.comms.whatsapp.bind));
    } else {
        comms_lines.push("💬 whatsapp: disabled".to_string());
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 💍 Wedding Concierge                                         ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧾 Bot: {:<52}║", config.bot_name);
    println!("║ 🧠 PID: {:<52}║", std::process::id());
    println!("║ 🛰️  Mode: {:<51}║", mode_text);
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 📡 Comms                                                     ║");
    for line in comms_lines {
        println!("║   {}║", fit(line));
    }
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧠 LLM                                                       ║");
    println!("║   {}║", fit(llm_line));
    println!("║   {}║", fit(memory_line));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧰 Tools                                                     ║");
    println!("║   {}║", fit(search_line));
    println!("║   {}║", fit(voice_line));
    println!("╚══════════════════════════════════════════════════════════════╝");

    if interactive {
        println!("💡 Type /reset to start the conversation over");
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: wedding-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Chat from the terminal (enables the console channel)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (routing, tool calls)
    //   -vvvv+  → trace  (full payloads)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}

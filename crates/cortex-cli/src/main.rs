//! `cortex-cli` – the interactive entry point for the robot brain.
//!
//! 1. Loads `~/.cortex/config.toml`; runs a **first-run wizard** when the
//!    file is absent.
//! 2. Probes the configured Ollama-compatible endpoint and reports
//!    available models.
//! 3. Spawns the cockpit HTTP/WebSocket server on the configured port,
//!    bridging the same session to any connected browser tab.
//! 4. Drops the user into an interactive REPL with slash commands
//!    (`/status`, `/map`, `/prompt`, `/run`, `/help`, `/quit`).
//! 5. Intercepts Ctrl-C for a clean shutdown of the REPL loop.

mod config;
mod ollama;
mod repl;

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cortex_cockpit::CockpitServer;
use cortex_memory::Checkpointer;
use cortex_middleware::EventBus;
use cortex_runtime::{HttpLmClient, Orchestrator};
use cortex_skills::{SimSkillExecutor, SimTelemetry, SimWorld};
use cortex_types::Pose;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() {
    let _guard = cortex_runtime::init_tracing("cortex-cli");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received, stopping...".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let cfg = match config::load() {
        Ok(None) => {
            let cfg = run_first_run_wizard();
            cfg
        }
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    print!("\n  Probing {} ... ", cfg.ollama_url.dimmed());
    match ollama::fetch_models(&cfg.ollama_url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for m in &models {
                println!("    - {}", m.name.bold());
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!("  No endpoint detected. Run `ollama serve` to start a local model.");
        }
    }

    let (orchestrator, world) = match build_orchestrator(&cfg) {
        Ok((o, w)) => (Arc::new(o), w),
        Err(e) => {
            eprintln!("{}: {}", "Failed to initialize runtime".red(), e);
            std::process::exit(1);
        }
    };

    let cockpit = CockpitServer::new(Arc::clone(&orchestrator), world).with_port(cfg.http_port);
    println!("  Cockpit UI on {}", format!("http://localhost:{}", cockpit.port()).bold());
    tokio::spawn(async move {
        if let Err(e) = cockpit.run().await {
            tracing::warn!(error = %e, "cockpit server exited");
        }
    });

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let mut final_state = repl::run(Arc::clone(&orchestrator), shutdown).await;

    // Clean interrupt: whatever caused the REPL to exit (Ctrl-C, EOF, /quit),
    // inject a STOP utterance so any running skills are cancelled and
    // resources released rather than left dangling at process exit.
    final_state.hci.utterance = "stop".to_string();
    let cancel = AtomicBool::new(false);
    orchestrator.run_pass(final_state, &cancel).await;
}

fn build_orchestrator(cfg: &config::Config) -> Result<(Orchestrator, Arc<SimWorld>), String> {
    let pose_mirror = Arc::new(RwLock::new(Pose::default()));
    let telemetry = Arc::new(SimTelemetry::new(Arc::clone(&pose_mirror)));
    let world = Arc::new(SimWorld::new());
    let skill_executor = Arc::new(SimSkillExecutor::new(pose_mirror));
    let lm_client = Arc::new(HttpLmClient::with_limits(
        cfg.ollama_url.clone(),
        cfg.active_model.clone(),
        cfg.rate_limit_rpm,
        cfg.token_budget,
    ));
    let checkpointer = Checkpointer::open(&cfg.db_path).map_err(|e| e.to_string())?;
    let bus = EventBus::default();

    let orchestrator = Orchestrator::new(telemetry, Arc::clone(&world), skill_executor, lm_client, checkpointer, bus);
    Ok((orchestrator, world))
}

// ─────────────────────────────────────────────────────────────────────────────
// First-run wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  Cortex first-run setup".bold().cyan());
    println!("  No configuration found. Let's set one up.\n");

    let mut cfg = config::Config::default();

    println!("  Which AI provider would you like to use?");
    println!("    1) Local AI via Ollama  (default, offline-first)");
    println!("    2) Cloud AI via OpenAI");
    println!("    3) Cloud AI via Anthropic");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    match choice.trim() {
        "2" => cfg.ai_provider = config::AiProvider::OpenAI,
        "3" => cfg.ai_provider = config::AiProvider::Anthropic,
        _ => cfg.ai_provider = config::AiProvider::Ollama,
    }

    let port_str = prompt_line(
        &format!("  HTTP/cockpit port [{}]: ", cfg.http_port),
        &cfg.http_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.http_port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "done.".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____          _           "#.bold().cyan());
    println!("{}", r#"  / ____|        | |          "#.bold().cyan());
    println!("{}", r#" | |     ___ _ __| |_ _____  __"#.bold().cyan());
    println!("{}", r#" | |    / _ \ '__| __/ _ \ \/ /"#.bold().cyan());
    println!("{}", r#" | |___| (_) | |  | ||  __/>  < "#.bold().cyan());
    println!("{}", r#"  \_____\___/|_|   \__\___/_/\_\"#.bold().cyan());
    println!();
    println!("  {} {}", "cortex".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Household service robot cognitive controller");
    println!();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

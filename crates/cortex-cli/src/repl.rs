//! REPL — Read-Eval-Print Loop for the interactive shell (§6, §10.7).
//!
//! Slash commands: `/status /map /prompt /run /help /quit`. Non-slash input
//! is classified by K1's rule-based HCI ingress: a non-NONE classification
//! is injected as the utterance and driven through one full Kernel+ReAct
//! pass; a NONE classification is routed to chit-chat against the LM client
//! directly, without touching the session snapshot.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use cortex_middleware::{ChatMessage as LmChatMessage, LmClient, Role};
use cortex_runtime::Orchestrator;
use cortex_types::{BrainState, InterruptClass};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const CHITCHAT_SYSTEM_PROMPT: &str =
    "You are a household service robot making small talk with its operator. \
Keep replies brief and friendly.";

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set (e.g. by the Ctrl-C
/// handler installed over rustyline's own Ctrl-C handling) the REPL exits
/// cleanly after finishing its current line.
pub async fn run(orchestrator: Arc<Orchestrator>, shutdown: Arc<AtomicBool>) -> BrainState {
    let mut state = orchestrator.new_session().await;
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start line editor".red(), e);
            return state;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let readline = editor.readline(&format!("{} ", "cortex>".bold().cyan()));
        let input = match readline {
            Ok(line) => {
                let trimmed = line.trim().to_string();
                if !trimmed.is_empty() {
                    let _ = editor.add_history_entry(trimmed.as_str());
                }
                trimmed
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        if input.is_empty() {
            continue;
        }

        if let Some(cmd) = input.strip_prefix('/') {
            match cmd.to_lowercase().as_str() {
                "help" => cmd_help(),
                "status" => cmd_status(&state),
                "map" => cmd_map(&state),
                "prompt" => cmd_prompt(&state),
                "run" => state = cmd_run(Arc::clone(&orchestrator), state).await,
                "quit" | "exit" | "q" => {
                    println!("{}", "Goodbye.".green());
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                other => {
                    println!(
                        "{} '/{}'. Type {} for available commands.",
                        "Unknown command:".red(),
                        other.yellow(),
                        "/help".bold()
                    );
                }
            }
            continue;
        }

        state = handle_utterance(Arc::clone(&orchestrator), state, &input).await;
    }

    state
}

// ─────────────────────────────────────────────────────────────────────────────
// Utterance routing
// ─────────────────────────────────────────────────────────────────────────────

/// Classify `text` with K1 and either drive a full pass (non-NONE) or answer
/// as chit-chat (NONE), per §6's CLI surface contract.
async fn handle_utterance(orchestrator: Arc<Orchestrator>, mut state: BrainState, text: &str) -> BrainState {
    state.hci.utterance = text.to_string();
    let classified = cortex_kernel::hci_ingress::run(state.clone());

    if classified.hci.interrupt_class == InterruptClass::None {
        state.messages.messages.push(cortex_types::ChatMessage::new("user", text));
        chitchat(orchestrator.lm_client(), text).await;
        state
    } else {
        println!("{}", format!("[utterance accepted] {text}").dimmed());
        let cancel = AtomicBool::new(false);
        let next = orchestrator.run_pass(state, &cancel).await;
        print_pass_result(&next);
        next
    }
}

async fn chitchat(client: Arc<dyn LmClient>, text: &str) {
    print!("{} ", "[robot]".bold());
    io::stdout().flush().ok();
    let messages = [LmChatMessage { role: Role::User, content: text.to_string() }];
    match client.generate(&messages, CHITCHAT_SYSTEM_PROMPT).await {
        Ok(reply) => println!("{reply}"),
        Err(e) => println!("{}", format!("(chat error: {e})").red()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Commands".bold().underline());
    println!("  {}  – show current state",          "/status".bold().cyan());
    println!("  {}     – show the zone map",         "/map".bold().cyan());
    println!("  {}  – show what the LM client sees", "/prompt".bold().cyan());
    println!("  {}     – run one Kernel+ReAct pass",  "/run".bold().cyan());
    println!("  {}  – exit the CLI",                 "/quit".bold().cyan());
    println!();
    println!("{}", "Interactive input (no slash)".bold().underline());
    println!("  stop / pause        – emergency stop / pause");
    println!("  go to <zone>        – navigate to a zone");
    println!("  anything else       – chit-chat with the robot");
    println!();
}

fn cmd_status(state: &BrainState) {
    println!("{}", "Status".bold().underline());
    println!("  Mode           : {:?}", state.tasks.mode);
    println!(
        "  Active task    : {}",
        state
            .tasks
            .active_task_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Task queue     : {} task(s)", state.tasks.queue.len());
    println!(
        "  Running skills : {}",
        state
            .skills
            .running
            .iter()
            .map(|s| s.skill_name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Battery        : {:.1}% ({:?})", state.robot.battery_pct, state.robot.battery_state);
    println!("  Pose           : ({:.1}, {:.1})", state.robot.pose.x, state.robot.pose.y);
    if let Some(decision) = &state.react.decision {
        println!("  Last decision  : {:?} — {}", decision.decision_type, decision.reason);
    }
}

fn cmd_map(state: &BrainState) {
    let (robot_x, robot_y) = (state.robot.pose.x, state.robot.pose.y);

    println!();
    println!(
        "{}",
        "Map (R=robot, C=charging_station, K=kitchen, L=living_room, B=bedroom, W=bathroom)".bold()
    );
    for y in (0..=15).rev() {
        let mut row = format!("{y:>3} |");
        for x in -2..16 {
            let (xf, yf) = (x as f64, y as f64);
            let cell = if (xf - robot_x).abs() < 0.5 && (yf - robot_y).abs() < 0.5 {
                'R'
            } else if let Some((name, _)) = cortex_types::ZONES
                .iter()
                .find(|(_, (zx, zy))| (xf - zx).abs() < 1.0 && (yf - zy).abs() < 1.0)
            {
                name.chars().next().unwrap_or('?').to_ascii_uppercase()
            } else {
                '.'
            };
            row.push(' ');
            row.push(cell);
        }
        println!("{row}");
    }
    println!();
    println!("  Robot pose: ({robot_x:.1}, {robot_y:.1})");
    println!("  Zone coordinates:");
    for (name, (x, y)) in cortex_types::ZONES {
        println!("    {name}: ({x}, {y})");
    }
}

fn cmd_prompt(state: &BrainState) {
    println!();
    println!("{}", "=".repeat(50));
    println!("{}", "LM input".bold());
    println!("{}", "=".repeat(50));

    println!("\n{}", "System prompt".underline());
    println!("{}", cortex_react::decide::SYSTEM_PROMPT);

    println!("\n{}", "Registered skills".underline());
    for (name, skill) in &state.skills.registry {
        println!("  - {name}: {}", skill.description);
    }

    println!("\n{}", "Current observation".underline());
    match &state.react.observation {
        Some(obs) => println!("{}", serde_json::to_string_pretty(obs).unwrap_or_default()),
        None => println!("  (none yet — run /run first)"),
    }

    println!("\n{}", "Recent messages".underline());
    for msg in state.messages.messages.iter().rev().take(5).rev() {
        println!("  [{}] {}", msg.role, truncate(&msg.content, 100));
    }
    println!("{}", "=".repeat(50));
}

async fn cmd_run(orchestrator: Arc<Orchestrator>, state: BrainState) -> BrainState {
    println!("{}", "[running...]".dimmed());
    let cancel = AtomicBool::new(false);
    let next = orchestrator.run_pass(state, &cancel).await;
    print_pass_result(&next);
    next
}

fn print_pass_result(state: &BrainState) {
    if !state.trace.lines.is_empty() {
        println!("\n{}", "Trace".underline());
        for line in state.trace.lines.iter().rev().take(5).rev() {
            println!("  {line}");
        }
    }
    if let Some(decision) = &state.react.decision {
        println!("\n{} {:?}: {}", "[decision]".bold(), decision.decision_type, decision.reason);
    }
    if let Some(ops) = &state.react.proposed_ops {
        if !ops.to_speak.is_empty() {
            println!("\n{}", "[robot says]".bold());
            for line in &ops.to_speak {
                println!("  {line}");
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

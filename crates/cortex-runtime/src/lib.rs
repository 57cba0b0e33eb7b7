//! `cortex-runtime` – the top-level orchestrator binding Kernel, ReAct,
//! memory, and the skill/telemetry/world/LM capability traits into one
//! runnable session driver (§4.15, §5, §10.1).
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: runs
//!   K1→K6 then, when routed to the ReAct loop, R1→R8 repeatedly until the
//!   loop stops or suspends for approval, checkpointing every stage
//!   boundary. [`run_simulation_loop`][orchestrator::run_simulation_loop]
//!   is the ≈10 Hz companion task that steps the bundled simulated
//!   telemetry source and triggers a pass on target completion or an
//!   active-task change.
//! - [`lm_client`] – [`HttpLmClient`][lm_client::HttpLmClient]: the bundled
//!   [`LmClient`][cortex_middleware::LmClient] implementation, talking to
//!   any OpenAI-compatible `/v1/chat/completions` endpoint (e.g.
//!   [Ollama](https://ollama.com)), with a token-bucket rate limiter, a
//!   cumulative token-budget circuit breaker, and TLS/loopback enforcement.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod lm_client;
pub mod orchestrator;
pub mod telemetry;

pub use lm_client::HttpLmClient;
pub use orchestrator::{run_simulation_loop, Orchestrator};
pub use telemetry::{init_tracing, TracerProviderGuard};

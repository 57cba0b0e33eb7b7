//! `cortex-cockpit` – the HTTP/WebSocket teleop & observability surface.
//!
//! Boots a lightweight HTTP + WebSocket server (default port `8080`) that:
//!
//! 1. **Serves** the static Cockpit single-page application at `GET /`.
//! 2. **Drives** a single Kernel+ReAct pass per chat/command/stop/pause/
//!    resume request, the same way the CLI's `/run` and plain-utterance
//!    paths do, via the injected [`Orchestrator`](cortex_runtime::Orchestrator).
//! 3. **Bridges** the orchestrator's [`EventBus`](cortex_middleware::EventBus)
//!    to every connected browser tab over a per-session WebSocket, so every
//!    post-stage snapshot streams to the UI in real time.
//! 4. **Accepts** obstacle-manipulation and utterance messages from the
//!    browser, either as HTTP POSTs or as WebSocket upstream messages.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cortex_cockpit::CockpitServer;
//! # use cortex_runtime::Orchestrator;
//! # use cortex_skills::SimWorld;
//!
//! # async fn example(orchestrator: Arc<Orchestrator>, world: Arc<SimWorld>) {
//! CockpitServer::new(orchestrator, world)
//!     .run()
//!     .await
//!     .expect("cockpit server failed");
//! # }
//! ```

pub mod server;

pub use server::{CockpitServer, DEFAULT_PORT};

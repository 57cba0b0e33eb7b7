//! `cortex-skills` – the default skill registry plus the simulated
//! backends (§10.6) that let the workspace run end to end without
//! physical hardware: an in-memory `SkillExecutor` for the three
//! built-in skills, and simulated `TelemetrySource`/`WorldSource`
//! implementations driven by a ~10 Hz background loop in `cortex-runtime`.

pub mod executor;
pub mod registry;
pub mod telemetry;
pub mod world;

pub use executor::SimSkillExecutor;
pub use registry::default_registry;
pub use telemetry::SimTelemetry;
pub use world::SimWorld;

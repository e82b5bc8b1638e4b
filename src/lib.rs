// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod challenge;
pub mod clock;
pub mod config;
pub mod penalty;
pub mod question;
pub mod runtime;
pub mod session;
pub mod store;
pub mod util;

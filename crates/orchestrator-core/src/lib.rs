//! Background coding-agent orchestrator core: the layered supervision
//! stack that drives an LLM through a tool-using reasoning loop while
//! every file-system and command-execution call is routed into a
//! disposable, network-isolated container.
//!
//! No `main.rs`, no argument parsing — `orchestrator-cli` wires this
//! library to the process boundary.

pub mod agentic_loop;
pub mod container;
pub mod error;
pub mod retry;
pub mod session;
pub mod summarizer;
pub mod tools;
pub mod types;
pub mod validator;

pub use agentic_loop::{AgentLoopDriver, LlmClient, ToolExecutor};
pub use container::{ContainerManager, ContainerRuntime, ContainerState};
pub use retry::{RetryOrchestrator, Verifier};
pub use session::{CancellationToken, SessionSupervisor};
pub use types::*;

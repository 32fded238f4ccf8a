//! The agent: page-content gate, tool-aware prompting and the orchestration
//! loop, plus the streaming plumbing around it.

pub mod gate;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod steps;
pub mod stream_view;
pub mod transport;

pub use gate::is_about_current_page;
pub use orchestrator::{DEFAULT_MAX_ITERATIONS, Orchestrator};
pub use prompt::{DEFAULT_BASE_PROMPT, system_prompt};
pub use session::{TurnOutcome, TurnSession, transcript_is_paired};
pub use steps::{ReasoningStep, StepLog};
pub use stream_view::{RenderedView, StreamView};
pub use transport::{AgentEventStream, EventSink, spawn_turn};

//! Prompt construction for chat turns.

pub mod assembler;
pub mod mode;

pub use assembler::{AssembledPrompt, ContextAssembler, PromptParts, build_messages, select_window};
pub use mode::{ModeSelection, ModeSelector, ResponseMode};

//! Spoken control commands handled without the completion backend.

/// Reply sent for the stop command.
pub const STOP_REPLY: &str = "Conversation stopped.";

/// Reply sent for the help command.
pub const HELP_REPLY: &str = "Available voice commands: \
- Say 'OpenAI' to navigate to chat. \
- Say 'stop' or 'pause' to stop the conversation. \
- Say 'help' for commands. \
- Say 'elaborate' followed by a topic for a detailed explanation. \
- Ask any question for a brief answer.";

/// Command reported back to the client with every chat reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChatCommand {
    /// Regular short answer.
    Normal,
    /// Detailed answer.
    Elaborate,
    /// Speech output should stop.
    Stop,
    /// Command list was returned.
    Help,
}

impl ChatCommand {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elaborate => "elaborate",
            Self::Stop => "stop",
            Self::Help => "help",
        }
    }
}

/// Match a whole message against the voice commands.
#[must_use]
pub fn voice_command(message: &str) -> Option<ChatCommand> {
    match message.trim().to_lowercase().as_str() {
        "stop" | "pause" | "halt" => Some(ChatCommand::Stop),
        "help" | "commands" => Some(ChatCommand::Help),
        _ => None,
    }
}

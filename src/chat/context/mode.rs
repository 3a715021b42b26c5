//! Response mode selection (terse vs elaborate).

use regex::Regex;

use crate::chat::core::config::{ModeConfig, ModeParams};
use crate::chat::core::errors::{ChatError, ChatResult};

/// How long and loose the reply should be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseMode {
    /// Short, low-temperature answers.
    Terse,
    /// Detailed, higher-temperature answers.
    Elaborate,
}

impl ResponseMode {
    /// Name reported to clients in the `command` field.
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Terse => "normal",
            Self::Elaborate => "elaborate",
        }
    }
}

/// Mode detected for a message plus the text to forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeSelection {
    /// Selected mode.
    pub mode: ResponseMode,
    /// Message with the directive removed.
    pub message: String,
}

/// Detects the elaborate directive and maps modes to sampling parameters.
pub struct ModeSelector {
    directive: Regex,
    config: ModeConfig,
}

impl ModeSelector {
    /// Build a selector from configuration.
    ///
    /// # Errors
    /// Returns an error if the directive is empty.
    pub fn new(config: &ModeConfig) -> ChatResult<Self> {
        let token = config.directive.trim();
        if token.is_empty() {
            return Err(ChatError::InvalidConfig(
                "modes.directive must not be empty".to_string(),
            ));
        }
        let directive = Regex::new(&format!("(?i){}", regex::escape(token)))
            .map_err(|err| ChatError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            directive,
            config: config.clone(),
        })
    }

    /// Case-insensitive substring match on the directive token.
    ///
    /// In elaborate mode every occurrence of the token is removed and the
    /// remaining whitespace collapsed. A message that was only the directive
    /// is forwarded unchanged.
    #[must_use]
    pub fn select(&self, message: &str) -> ModeSelection {
        let message = message.trim();
        if !self.directive.is_match(message) {
            return ModeSelection {
                mode: ResponseMode::Terse,
                message: message.to_string(),
            };
        }

        let stripped = self.directive.replace_all(message, " ");
        let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        ModeSelection {
            mode: ResponseMode::Elaborate,
            message: if stripped.is_empty() {
                message.to_string()
            } else {
                stripped
            },
        }
    }

    /// Sampling parameters for a mode.
    #[must_use]
    pub const fn params(&self, mode: ResponseMode) -> &ModeParams {
        match mode {
            ResponseMode::Terse => &self.config.terse,
            ResponseMode::Elaborate => &self.config.elaborate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ModeSelector {
        ModeSelector::new(&ModeConfig::default()).unwrap()
    }

    #[test]
    fn elaborate_token_is_stripped() {
        let selection = selector().select("elaborate on photosynthesis");
        assert_eq!(selection.mode, ResponseMode::Elaborate);
        assert_eq!(selection.message, "on photosynthesis");
    }

    #[test]
    fn detection_is_case_insensitive_and_substring() {
        let selection = selector().select("Please ELABORATE about black holes");
        assert_eq!(selection.mode, ResponseMode::Elaborate);
        assert_eq!(selection.message, "Please about black holes");
    }

    #[test]
    fn plain_messages_stay_terse() {
        let selection = selector().select("  what time is it? ");
        assert_eq!(selection.mode, ResponseMode::Terse);
        assert_eq!(selection.message, "what time is it?");
    }

    #[test]
    fn bare_directive_is_forwarded_unchanged() {
        let selection = selector().select("Elaborate");
        assert_eq!(selection.mode, ResponseMode::Elaborate);
        assert_eq!(selection.message, "Elaborate");
    }

    #[test]
    fn elaborate_mode_has_the_larger_budget() {
        let selector = selector();
        let terse = selector.params(ResponseMode::Terse);
        let elaborate = selector.params(ResponseMode::Elaborate);
        assert_eq!(terse.max_tokens, 300);
        assert_eq!(elaborate.max_tokens, 800);
        assert!(elaborate.temperature > terse.temperature);
        assert_ne!(terse.instruction, elaborate.instruction);
    }
}

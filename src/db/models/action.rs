use std::fmt;

/// Formal moderation actions that are counted per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Warning,
    Mute,
    Kick,
    Ban,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Warning,
        ActionType::Mute,
        ActionType::Kick,
        ActionType::Ban,
    ];

    /// Name of the persisted counter key
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Warning => "warnings",
            ActionType::Mute => "mutes",
            ActionType::Kick => "kicks",
            ActionType::Ban => "bans",
        }
    }

    /// Label used in case log entries
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Warning => "Warn",
            ActionType::Mute => "Mute",
            ActionType::Kick => "Kick",
            ActionType::Ban => "Ban",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

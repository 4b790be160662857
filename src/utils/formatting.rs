use crate::db::models::ActionType;

/// Format a user mention
pub fn mention_user(user_id: u64) -> String {
    format!("<@{}>", user_id)
}

/// Format a channel mention
pub fn mention_channel(channel_id: u64) -> String {
    format!("<#{}>", channel_id)
}

/// A moderation case as posted to the mod-log channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseEntry {
    pub user_id: u64,
    pub user_tag: String,
    pub kind: CaseKind,
    pub reason: String,
    pub issuer_tag: String,
    /// Rendered duration, for timed sanctions
    pub length: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Action(ActionType),
    Unmute,
    Unban,
    Softban,
}

impl CaseKind {
    pub fn label(&self) -> &'static str {
        match self {
            CaseKind::Action(action) => action.label(),
            CaseKind::Unmute => "Unmute",
            CaseKind::Unban => "Unban",
            CaseKind::Softban => "Softban",
        }
    }
}

/// Render a case for the mod-log channel
pub fn case_message(case: u64, entry: &CaseEntry) -> String {
    let mut text = format!(
        "**Case {} | {}**\n`Member:` {} ({})\n",
        case,
        entry.kind.label(),
        mention_user(entry.user_id),
        entry.user_tag
    );
    if let Some(length) = &entry.length {
        text.push_str(&format!("`Length:` {}\n", length));
    }
    text.push_str(&format!(
        "`Reason:` {}\n`Issuer:` {}",
        entry.reason, entry.issuer_tag
    ));
    text
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

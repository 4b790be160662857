use serde::{Deserialize, Serialize};

/// Per-guild ids captured once by `/modconfig`, so roles and channels are
/// never looked up by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSettings {
    #[serde(default)]
    pub muted_role: Option<u64>,
    #[serde(default)]
    pub mod_log_channel: Option<u64>,
}

use std::sync::Arc;

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, warn};

use crate::services::moderation::lockdown::LockdownExpired;
use crate::services::platform::ChatPlatform;

pub const LOCKDOWN_ENDED_MESSAGE: &str = "**The lockdown on this channel has ended.**";

/// Announce expired lockdowns in their channels
pub fn spawn_lockdown_listener(platform: Arc<dyn ChatPlatform>, mut events: Receiver<LockdownExpired>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = platform
                        .send_channel_message(event.channel_id, LOCKDOWN_ENDED_MESSAGE)
                        .await
                    {
                        debug!(
                            "Could not announce lockdown end in channel {}: {:?}",
                            event.channel_id, e
                        );
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Lockdown listener missed {} expiry events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

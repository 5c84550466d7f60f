//! Keeps one visible reply alive across a chain of interaction tokens.
//!
//! Multi-step flows (button press, select, modal submit) each arrive with a
//! fresh interaction token. The tracker routes every step's edit to the reply
//! created by the flow's entry point and removes the placeholder each later
//! step would otherwise leave behind.

use std::sync::Arc;

use muster_core::{ChatPlatform, Interaction, MessagePayload, PlatformError, RenderedMessage};
use tokio::sync::Mutex;

/// Reply continuity record for one logical interactive flow.
pub struct ReplyContinuity {
    platform: Arc<dyn ChatPlatform>,
    held: Mutex<Interaction>,
}

impl ReplyContinuity {
    pub fn new(platform: Arc<dyn ChatPlatform>, entry: Interaction) -> Self {
        Self {
            platform,
            held: Mutex::new(entry),
        }
    }

    /// Returns the interaction currently representing this reply.
    pub async fn current(&self) -> Interaction {
        self.held.lock().await.clone()
    }

    /// Repoints the reply at a fresh top-level entry point.
    pub async fn reset(&self, interaction: Interaction) {
        *self.held.lock().await = interaction;
    }

    /// Edits the flow's visible reply on behalf of `candidate`.
    ///
    /// Errors other than an expired held token are returned unchanged.
    pub async fn edit_reply(
        &self,
        candidate: Option<&Interaction>,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let mut held = self.held.lock().await;
        let candidate = match candidate {
            Some(candidate) if *candidate != *held => candidate,
            _ => return self.platform.edit_interaction_reply(&held, payload).await,
        };

        match self.platform.edit_interaction_reply(&held, payload).await {
            Ok(message) => {
                self.discard_pending_reply(candidate).await;
                Ok(message)
            }
            Err(error) if error.is_unknown_interaction() => {
                tracing::debug!(
                    expired_interaction = %held.id,
                    promoted_interaction = %candidate.id,
                    "held interaction expired; promoting newer token"
                );
                *held = candidate.clone();
                self.platform.edit_interaction_reply(&held, payload).await
            }
            Err(error) => Err(error),
        }
    }

    async fn discard_pending_reply(&self, interaction: &Interaction) {
        if let Err(error) = self.platform.delete_interaction_reply(interaction).await {
            tracing::warn!(
                interaction = %interaction.id,
                %error,
                "failed to discard superseded interaction reply"
            );
        }
    }
}

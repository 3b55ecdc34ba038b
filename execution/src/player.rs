use serde::Serialize;
use slotfactory_types::Envelope;
use slotfactory_wss::{ClientHandle, SendError};

/// An authenticated identity bound to exactly one connection.
#[derive(Clone, Debug)]
pub struct Player {
    id: String,
    name: String,
    client: ClientHandle,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, client: ClientHandle) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Queues an `{action, payload}` frame for this player.
    ///
    /// Delivery is best effort; frames for a closed connection are dropped.
    pub fn send<P: Serialize>(&self, action: &str, payload: P) {
        let frame = match Envelope::new(action, payload).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(player_id = %self.id, action, error = %e, "failed to encode frame");
                return;
            }
        };
        match self.client.send(frame) {
            Ok(()) | Err(SendError::Closed) => {}
            Err(SendError::QueueFull) => {
                tracing::warn!(player_id = %self.id, action, "dropped frame for slow player");
            }
        }
    }

    pub fn kick(&self, reason: &str) {
        self.client.kick(reason);
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.client.id() == other.client.id()
    }
}

impl Eq for Player {}

//! Chat turn pipeline: request types, prompt assembly, title
//! generation, the stream orchestrator, and the resume registry.

pub mod orchestrator;
pub mod prompts;
pub mod resume;
pub mod title;
pub mod types;

use std::sync::Arc;
use tokio::sync::mpsc;

pub use orchestrator::{TurnDeps, run_turn};
pub use resume::StreamRegistry;
pub use types::{ChatEvent, IncomingMessage, TurnRequest};

/// Fan-out point for one turn's events: everything goes to the client
/// channel and, when resumption is enabled, to the stream registry.
/// Client disconnect makes the channel send fail; that is deliberately
/// ignored so generation and persistence continue.
#[derive(Clone)]
pub struct Emitter {
    client: mpsc::Sender<ChatEvent>,
    registry: Option<(Arc<StreamRegistry>, String)>,
}

impl Emitter {
    pub fn new(
        client: mpsc::Sender<ChatEvent>,
        registry: Option<(Arc<StreamRegistry>, String)>,
    ) -> Self {
        Self { client, registry }
    }

    pub async fn send(&self, event: ChatEvent) {
        if let Some((registry, stream_id)) = &self.registry {
            registry.publish(stream_id, event.clone());
        }
        let _ = self.client.send(event).await;
    }

    /// Mark the registry side complete. The client channel closes when
    /// the emitter is dropped.
    pub fn finish(&self) {
        if let Some((registry, stream_id)) = &self.registry {
            registry.finish(stream_id);
        }
    }
}

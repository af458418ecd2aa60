use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::bridge::envelope::{BridgeEnvelope, HostMessageType, UiMessageType};
use crate::bridge::schemas::{ENVELOPE_SCHEMA, PAYLOAD_SCHEMAS};
use crate::util::random_id_hex;

const CHANNEL_ID_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub allowed_origins: Vec<String>,
    pub dev_mode: bool,
}

/// Seam to the embedding mechanism's cross-origin messaging primitive. The
/// host posts envelopes through it; inbound traffic arrives via
/// [`BridgeChannel::handle_message`].
pub trait BridgeTransport: Send + Sync + Debug {
    fn post(&self, envelope: &BridgeEnvelope, target_origin: &str);
}

/// A validated inbound message: known type, schema-checked payload, and the
/// channel id it arrived on.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_type: UiMessageType,
    pub payload: Value,
    pub channel_id: String,
}

pub type InboundHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

struct Attached {
    channel_id: String,
    transport: Arc<dyn BridgeTransport>,
    handler: InboundHandler,
}

/// Validated bidirectional channel between the host and the embedded UI.
///
/// Each attach mints a fresh random channel id that must accompany every
/// message in both directions; re-attaching invalidates the old id, so late
/// messages from a previous embedding session are silently dropped.
pub struct BridgeChannel {
    config: BridgeConfig,
    attached: Mutex<Option<Attached>>,
}

impl BridgeChannel {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            attached: Mutex::new(None),
        }
    }

    /// Attach to a freshly embedded UI. Replaces any previous attachment and
    /// returns the new channel id.
    pub fn attach(
        &self,
        transport: Arc<dyn BridgeTransport>,
        handler: impl Fn(InboundMessage) + Send + Sync + 'static,
    ) -> String {
        let channel_id = random_id_hex(CHANNEL_ID_BYTES);
        *self.attached.lock().expect("bridge lock") = Some(Attached {
            channel_id: channel_id.clone(),
            transport,
            handler: Arc::new(handler),
        });
        channel_id
    }

    /// Safe to call repeatedly; subsequent calls are no-ops.
    pub fn detach(&self) {
        *self.attached.lock().expect("bridge lock") = None;
    }

    pub fn channel_id(&self) -> Option<String> {
        self.attached
            .lock()
            .expect("bridge lock")
            .as_ref()
            .map(|a| a.channel_id.clone())
    }

    /// Wrap `payload` in an envelope for the current channel and post it to
    /// the embedded UI. Dropped with a warning when not attached.
    pub fn send(&self, message_type: HostMessageType, payload: Value) {
        let guard = self.attached.lock().expect("bridge lock");
        let Some(attached) = guard.as_ref() else {
            warn!("cannot send {}: bridge not attached", message_type.as_str());
            return;
        };
        let envelope =
            BridgeEnvelope::new(&attached.channel_id, message_type.as_str(), payload);
        // Wildcard targeting is acceptable only against the local dev server.
        let target_origin = if self.config.dev_mode {
            "*"
        } else {
            self.config
                .allowed_origins
                .first()
                .map(String::as_str)
                .unwrap_or("*")
        };
        attached.transport.post(&envelope, target_origin);
    }

    /// Entry point for raw messages from the embedding mechanism. Applies, in
    /// order: origin allow-list, envelope shape, channel id, payload schema.
    /// Anything that fails a check is dropped without reaching the handler.
    pub fn handle_message(&self, origin: &str, data: Value) {
        if !self.is_origin_allowed(origin) {
            warn!(%origin, "rejected bridge message from disallowed origin");
            return;
        }

        if !ENVELOPE_SCHEMA.is_valid(&data) {
            debug!("rejected bridge message with malformed envelope");
            return;
        }
        let envelope: BridgeEnvelope = match serde_json::from_value(data) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!("rejected undeserializable bridge envelope: {err}");
                return;
            }
        };

        let handler = {
            let guard = self.attached.lock().expect("bridge lock");
            let Some(attached) = guard.as_ref() else {
                debug!("dropping bridge message: not attached");
                return;
            };
            if envelope.channel_id != attached.channel_id {
                warn!("rejected bridge message with stale channel id");
                return;
            }
            Arc::clone(&attached.handler)
        };

        let Some(message_type) = UiMessageType::from_tag(&envelope.message_type) else {
            debug!(
                message_type = %envelope.message_type,
                "dropping bridge message with unknown type"
            );
            return;
        };

        if let Some(schema) = PAYLOAD_SCHEMAS.get(message_type.as_str())
            && !schema.is_valid(&envelope.payload)
        {
            warn!(
                message_type = message_type.as_str(),
                "rejected bridge message with invalid payload"
            );
            return;
        }

        handler(InboundMessage {
            message_type,
            payload: envelope.payload,
            channel_id: envelope.channel_id,
        });
    }

    fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.config.dev_mode && origin.starts_with("http://localhost") {
            return true;
        }
        self.config.allowed_origins.iter().any(|o| o == origin)
    }
}

impl Debug for BridgeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeChannel")
            .field("config", &self.config)
            .field("channel_id", &self.channel_id())
            .finish()
    }
}

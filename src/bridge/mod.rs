pub mod channel;
pub mod envelope;
pub mod schemas;

pub use channel::{BridgeChannel, BridgeConfig, BridgeTransport, InboundMessage};
pub use envelope::{
    BRIDGE_PROTOCOL, BRIDGE_VERSION, BridgeEnvelope, HostMessageType, UiMessageType,
};

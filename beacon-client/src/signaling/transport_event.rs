use beacon_core::ServerMessage;

/// Subscribe side of the signaling transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A validated message from the relay.
    Message(ServerMessage),

    /// The socket dropped and was re-established. The relay sees a new
    /// identity, so room membership must be re-requested.
    Reconnected,

    /// The socket dropped; the transport keeps trying in the background.
    Closed,
}

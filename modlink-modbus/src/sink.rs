//! Destinations for attribute updates.

use modlink_common::{AttributeRef, AttributeUpdate, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives the values produced by polling.
pub trait AttributeSink: Send + Sync + 'static {
    /// Push a new value for a linked attribute.
    fn publish(&self, attribute_ref: &AttributeRef, value: Value);
}

/// Sink forwarding timestamped updates over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AttributeUpdate>,
}

impl ChannelSink {
    /// Create a sink and the receiver for its updates.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AttributeUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AttributeSink for ChannelSink {
    fn publish(&self, attribute_ref: &AttributeRef, value: Value) {
        let update = AttributeUpdate::new(attribute_ref.clone(), value);
        if self.tx.send(update).is_err() {
            debug!(attribute = %attribute_ref, "Update receiver dropped");
        }
    }
}

/// Sink that only logs updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AttributeSink for LogSink {
    fn publish(&self, attribute_ref: &AttributeRef, value: Value) {
        info!(attribute = %attribute_ref, value = %value, "Attribute updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_updates() {
        let (sink, mut rx) = ChannelSink::new();
        let attribute_ref = AttributeRef::new("meter", "power");

        sink.publish(&attribute_ref, Value::Number(1.5));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.attribute_ref, attribute_ref);
        assert_eq!(update.value, Value::Number(1.5));
        assert!(update.timestamp > 0);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.publish(&AttributeRef::new("meter", "power"), Value::Integer(1));
    }
}

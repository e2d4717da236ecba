//! Warning events and where they are sent.
//!
//! Alerts are fire-and-forget: [`AlertSink::publish`] never blocks and never reports failure to
//! the caller. Delivery is at most once.

use std::{
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::config::MqttConfig;

/// Event tag of the alert sent when an open hand is detected.
pub const HAND_OPEN: &str = "HAND_OPEN";

/// Message carried by alerts unless configured otherwise.
pub const DEFAULT_MESSAGE: &str = "WARNING: customer requests help";

/// Capacity of the request channel between [`MqttSink`] and its event loop task.
const REQUEST_CAPACITY: usize = 10;

/// Delay before polling the event loop again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// A warning event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Constant tag identifying the kind of event.
    pub event: String,
    /// Human-readable message.
    pub message: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl Alert {
    /// Creates a [`HAND_OPEN`] alert stamped with the current time.
    pub fn hand_open(message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        Self {
            event: HAND_OPEN.to_string(),
            message: message.into(),
            timestamp,
        }
    }

    /// Serializes the alert to its JSON wire format.
    pub fn to_json(&self) -> Vec<u8> {
        // Serializing a struct of strings and a float cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Receives alerts.
pub trait AlertSink: Send + Sync {
    /// Sends `alert` without waiting for delivery. Failures are logged, not returned.
    fn publish(&self, alert: &Alert);
}

/// An [`AlertSink`] that only logs alerts.
///
/// Used when no message broker is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn publish(&self, alert: &Alert) {
        log::warn!("{}: {}", alert.event, alert.message);
    }
}

/// Publishes alerts to an MQTT topic.
///
/// The connection is driven by a background task on the tokio runtime passed to
/// [`MqttSink::connect`]. Connection failures are logged by that task and retried on the next
/// poll; they never reach the code publishing alerts.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttSink {
    /// Starts the MQTT client and its event loop task.
    ///
    /// This does not wait for the broker connection to be established.
    pub fn connect(config: &MqttConfig, runtime: &Handle) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let broker = format!("{}:{}", config.host, config.port);
        log::info!("connecting to MQTT broker at {broker}");

        let task = runtime.spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        log::info!("connected to MQTT broker at {broker} ({:?})", ack.code);
                    }
                    Ok(event) => log::trace!("mqtt: {:?}", event),
                    Err(e) => {
                        log::warn!("MQTT connection to {broker} failed: {e}");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: config.topic.clone(),
            event_loop: Mutex::new(Some(task)),
        }
    }

    /// Disconnects from the broker and stops the event loop task.
    pub async fn shutdown(&self) {
        // Does not wait for queue space, so an unreachable broker cannot stall shutdown.
        if let Err(e) = self.client.try_disconnect() {
            log::debug!("MQTT disconnect failed: {e}");
        }
        let task = self
            .event_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            // Give the event loop a moment to flush the disconnect packet.
            tokio::time::sleep(Duration::from_millis(100)).await;
            task.abort();
        }
    }
}

impl AlertSink for MqttSink {
    fn publish(&self, alert: &Alert) {
        match self
            .client
            .try_publish(&self.topic, QoS::AtMostOnce, false, alert.to_json())
        {
            Ok(()) => log::debug!("published {} alert to '{}'", alert.event, self.topic),
            Err(e) => log::error!("failed to publish alert to '{}': {e}", self.topic),
        }
    }
}

impl<S: AlertSink + ?Sized> AlertSink for std::sync::Arc<S> {
    fn publish(&self, alert: &Alert) {
        (**self).publish(alert)
    }
}

//! MQTT transport adapter for the sensor link (§4.8, §6.1).
//!
//! Owns the broker connection on its own task. Decodes inbound `PUBLISH`es on the
//! temperature and status topics into kernel commands, and drains the kernel's outbound
//! sampling-period channel to `PUBLISH` the frequency topic at QoS 1. Reconnection is left
//! entirely to `rumqttc`'s event loop; this adapter never tears down or signals the kernel
//! on disconnect beyond forwarding an `OnSensorHealth("OFFLINE", ...)` command.

use std::time::Duration;

use kernel_core::KernelHandle;
use kernel_messages::{FrequencyPayload, StatusPayload, TemperaturePayload};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Broker connection and topic layout for the sensor link.
#[derive(Debug, Clone)]
pub struct SensorLinkConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub temperature_topic: String,
    pub status_topic: String,
    pub frequency_topic: String,
}

impl Default for SensorLinkConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "control-unit".to_string(),
            temperature_topic: "assignment3/temperature".to_string(),
            status_topic: "assignment3/status".to_string(),
            frequency_topic: "assignment3/frequency".to_string(),
        }
    }
}

const EVENT_CHANNEL_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Run the sensor link until `outbound_rx` is closed. Never returns early on broker
/// disconnect: `rumqttc` reconnects autonomously and this task just keeps polling.
pub async fn run(handle: KernelHandle, config: SensorLinkConfig, mut outbound_rx: mpsc::Receiver<u64>) {
    let mut options = MqttOptions::new(config.client_id.clone(), config.broker_host.clone(), config.broker_port);
    options.set_keep_alive(KEEP_ALIVE);

    let (client, mut event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

    if let Err(err) = client.subscribe(&config.temperature_topic, QoS::AtMostOnce).await {
        error!(%err, topic = %config.temperature_topic, "failed to subscribe to temperature topic");
    }
    if let Err(err) = client.subscribe(&config.status_topic, QoS::AtMostOnce).await {
        error!(%err, topic = %config.status_topic, "failed to subscribe to status topic");
    }

    loop {
        tokio::select! {
            poll = event_loop.poll() => {
                match poll {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_publish(&handle, &config, &publish.topic, publish.payload.as_ref()).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(host = %config.broker_host, port = config.broker_port, "connected to sensor broker");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "sensor broker connection lost, reconnecting");
                        handle.on_sensor_health(kernel_messages::SensorHealth::OFFLINE.to_string(), serde_json::Map::new()).await;
                    }
                }
            }
            Some(seconds) = outbound_rx.recv() => {
                publish_frequency(&client, &config.frequency_topic, seconds).await;
            }
            else => break,
        }
    }
}

async fn handle_publish(handle: &KernelHandle, config: &SensorLinkConfig, topic: &str, payload: &[u8]) {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, %topic, "sensor payload is not valid UTF-8, dropping");
            return;
        }
    };

    if topic == config.temperature_topic {
        match serde_json::from_str::<TemperaturePayload>(text) {
            Ok(reading) => handle.on_sample(reading.temperature).await,
            Err(err) => warn!(%err, payload = %text, "malformed temperature payload, dropping"),
        }
    } else if topic == config.status_topic {
        match serde_json::from_str::<StatusPayload>(text) {
            Ok(status) => handle.on_sensor_health(status.status, status.raw).await,
            Err(err) => warn!(%err, payload = %text, "malformed status payload, dropping"),
        }
    } else {
        debug!(%topic, "message on unhandled topic");
    }
}

async fn publish_frequency(client: &AsyncClient, topic: &str, seconds: u64) {
    let payload = match serde_json::to_vec(&FrequencyPayload { frequency: seconds }) {
        Ok(payload) => payload,
        Err(err) => {
            error!(%err, "failed to encode frequency payload");
            return;
        }
    };

    match client.publish(topic, QoS::AtLeastOnce, false, payload).await {
        Ok(()) => info!(%topic, seconds, "published sampling frequency"),
        Err(err) => error!(%err, %topic, "failed to publish sampling frequency"),
    }
}

//! MQTT channel — async client for the local home-automation broker.
//!
//! Wraps `rumqttc::AsyncClient` with a small `Channel` trait so the bridge
//! logic in `discovery`/`publish`/`command` can be exercised against a
//! `MockChannel` in tests, and driven by a real broker connection in
//! `lb-server`.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

/// Abstraction for MQTT message publishing and subscribing.
///
/// Enables mocking in tests without a real MQTT broker. Retain is an
/// explicit parameter rather than always-false: discovery, availability,
/// and fan-preset messages MUST be retained (§9 "Retained vs non-retained"),
/// while brightness/rgb/color_temp status is not.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> MqttResult<()>;

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;
}

/// MQTT channel connected to the local broker.
///
/// Owns the `AsyncClient` for publishing/subscribing. The `EventLoop` is
/// returned separately from `new()` — the caller (`lb-server`'s supervisor)
/// must drive it in a spawned task via `eventloop.poll()`.
pub struct MqttChannel {
    client: AsyncClient,
    base_topic: String,
}

impl MqttChannel {
    /// Create a channel against `config`, setting a last-will on the bridge
    /// status topic so a broker-observed disconnect (crash, network loss)
    /// is distinguishable from a clean shutdown without the controller
    /// having to publish anything itself (§7, "availability topic is
    /// republished on reconnect (last-will established at connect)").
    pub fn new(config: &MqttConfig) -> MqttResult<(Self, EventLoop)> {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let bridge_status_topic = format!("{}/bridge/status", config.base_topic);
        options.set_last_will(LastWill::new(
            &bridge_status_topic,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let transport = if config.use_tls {
            tls::load_tls_transport(config)?
        } else {
            tls::plaintext_transport()
        };
        options.set_transport(transport);

        let (client, eventloop) = AsyncClient::new(options, 64);

        Ok((
            Self {
                client,
                base_topic: config.base_topic.clone(),
            },
            eventloop,
        ))
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Announce the bridge itself as online, retained, clearing the way for
    /// the last-will "offline" to take over on an unclean disconnect.
    pub async fn announce_online(&self) -> MqttResult<()> {
        let topic = format!("{}/bridge/status", self.base_topic);
        self.publish(&topic, b"online", QoS::AtLeastOnce, true).await
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> MqttResult<()> {
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }
}

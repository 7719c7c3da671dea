//! Publishes the retained Home Assistant discovery documents at startup
//! (§4.6): one per device via `lb_mqtt::discovery`, plus one per group that
//! is not fan-only, built here since groups carry no discovery shape of
//! their own in `lb-mqtt` (a group is a light-like on/off + brightness
//! aggregate, never a distinct platform choice the way a device is).

use std::sync::Arc;

use rumqttc::QoS;
use serde_json::{json, Value};

use lb_mesh::MeshState;
use lb_mqtt::Channel;
use lb_protocol::topics::{self, Platform};

/// Publish discovery documents for every device, then every non-fan-only
/// group. `group_hass_id` is the caller's synthesized id-to-topic-segment
/// convention, kept out of this module so it stays the supervisor's call.
pub async fn publish_all(
    mqtt: &Arc<dyn Channel>,
    mesh: &Arc<MeshState>,
    base_topic: &str,
    group_hass_id: impl Fn(u16) -> String,
) {
    for device in mesh.devices.all() {
        let (platform, doc) = lb_mqtt::discovery::build(&device, base_topic);
        let topic = topics::discovery_config(platform.as_str(), &device.hass_id);
        publish_retained(mqtt, &topic, &doc).await;
    }

    for group in mesh.groups.all() {
        let is_fan_only = mesh
            .groups
            .is_fan_only(group.id, &mesh.devices)
            .unwrap_or(false);
        if is_fan_only {
            continue;
        }
        let hass_id = group_hass_id(group.id);
        let doc = group_document(&group.name, &hass_id, base_topic);
        let topic = topics::discovery_config(Platform::Light.as_str(), &hass_id);
        publish_retained(mqtt, &topic, &doc).await;
    }
}

fn group_document(name: &str, hass_id: &str, base_topic: &str) -> Value {
    json!({
        "name": name,
        "unique_id": hass_id,
        "schema": "json",
        "state_topic": topics::status(base_topic, hass_id),
        "command_topic": topics::set(base_topic, hass_id),
        "supported_color_modes": ["brightness"],
    })
}

async fn publish_retained(mqtt: &Arc<dyn Channel>, topic: &str, doc: &Value) {
    let payload = match serde_json::to_vec(doc) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(%topic, %err, "failed to serialize discovery document");
            return;
        }
    };
    if let Err(err) = mqtt.publish(topic, &payload, QoS::AtLeastOnce, true).await {
        tracing::warn!(%topic, %err, "failed to publish discovery document");
    }
}

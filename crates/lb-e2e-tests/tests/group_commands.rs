//! S2: a group-off command propagates an optimistic publish to every
//! non-switch member immediately, then resyncs switch members once the
//! group dispatch is acked — unless a switch has its own command pending.

mod helpers;

use helpers::Harness;
use lb_protocol::device::CommandKind;
use lb_protocol::packet::PowerState;

#[tokio::test]
async fn group_off_prepublishes_bulbs_then_syncs_the_switch_on_ack() {
    let mut h = Harness::new();
    h.mesh.devices.apply_optimistic(4, |s| s.power = PowerState::On).unwrap();
    h.mesh.devices.apply_optimistic(6, |s| s.power = PowerState::On).unwrap();
    h.mesh.devices.apply_optimistic(26, |s| s.power = PowerState::On).unwrap();
    h.mqtt.reset();

    let rx = h.bridge_rx.remove(&1).unwrap();
    let mut rx = rx;
    let api = h.api;
    let handle = tokio::spawn(async move { api.group_set_power(9001, false).await });

    let frame = rx.recv().await.unwrap();
    tokio::task::yield_now().await;

    // Bulbs are optimistically published right away; the switch is not
    // touched until the group dispatch is acked.
    assert_eq!(h.mqtt.published_to(&format!("cync/status/{}", Harness::hass_id(4))).len(), 1);
    assert_eq!(h.mqtt.published_to(&format!("cync/status/{}", Harness::hass_id(6))).len(), 1);
    assert!(h.mqtt.published_to(&format!("cync/status/{}", Harness::hass_id(26))).is_empty());

    let msg_id = u16::from_be_bytes([frame[6], frame[7]]);
    h.acks.resolve(1, (9001u16 & 0xff) as u8, msg_id, None);
    handle.await.unwrap().unwrap();

    let switch_published = h.mqtt.published_to(&format!("cync/status/{}", Harness::hass_id(26)));
    assert_eq!(switch_published.len(), 1);
    assert_eq!(switch_published.last().unwrap().payload, b"OFF");
}

#[tokio::test]
async fn switch_with_its_own_pending_command_is_skipped_during_group_sync() {
    let h = Harness::new();
    h.mesh.devices.take_pending(26, CommandKind::Power).unwrap();
    h.api.sync_group_switches(9001).await.unwrap();
    assert!(h.mqtt.published_to(&format!("cync/status/{}", Harness::hass_id(26))).is_empty());
}

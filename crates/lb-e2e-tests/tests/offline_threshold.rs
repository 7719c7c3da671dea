//! S3: a device only flips offline after three consecutive "not connected"
//! status reports, and only flips back online on the very next report that
//! says it rejoined — every report in between is a no-op for availability.

mod helpers;

use helpers::Harness;
use lb_mesh::store::AvailabilityChange;
use lb_mqtt::publish;
use lb_protocol::packet::{PowerState, StatusFields};

fn status(connected: bool) -> StatusFields {
    StatusFields {
        device_id: 4,
        connected_to_mesh: connected,
        power: PowerState::On,
        brightness_wire: None,
        color_temp_wire: None,
        rgb: None,
    }
}

#[tokio::test]
async fn three_consecutive_drops_then_a_single_recovery_report() {
    let h = Harness::new();
    // Reported sequence: 1, 1, 0, 0, 0, 1.
    let sequence = [true, true, false, false, false, true];
    let mut changes = Vec::new();
    for connected in sequence {
        let change = h.mesh.devices.apply_status(&status(connected)).unwrap();
        changes.push(change);
    }

    assert_eq!(
        changes,
        vec![
            AvailabilityChange::BecameOnline,
            AvailabilityChange::Unchanged,
            AvailabilityChange::Unchanged,
            AvailabilityChange::Unchanged,
            AvailabilityChange::BecameOffline,
            AvailabilityChange::BecameOnline,
        ]
    );

    let device = h.mesh.devices.get(4).unwrap();
    assert!(device.availability.online);

    // The same publish logic the connection handler drives from these
    // transitions: only the two bolded changes above produce an
    // availability message at all.
    let offline_msg = publish::availability_message(&device, "cync", false);
    let online_msg = publish::availability_message(&device, "cync", true);
    assert_eq!(offline_msg.topic, online_msg.topic, "availability is one retained topic per device");
}

#[tokio::test]
async fn a_single_drop_does_not_flip_availability() {
    let h = Harness::new();
    h.mesh.devices.apply_status(&status(true)).unwrap();
    let change = h.mesh.devices.apply_status(&status(false)).unwrap();
    assert_eq!(change, AvailabilityChange::Unchanged);
    assert!(h.mesh.devices.get(4).unwrap().availability.online);
}

use crate::device::Device;
use crate::packet::PowerState;

/// A configured group of devices (§3). Groups are declared, never discovered.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: u16,
    pub name: String,
    pub member_ids: Vec<u8>,
}

impl Group {
    /// True if every member is a fan controller — such a group is not
    /// registered as a discovery entity (§4.6, "Groups").
    pub fn is_fan_only(&self, members: &[&Device]) -> bool {
        !members.is_empty()
            && members
                .iter()
                .all(|d| d.has(crate::device::Capabilities::FAN_SPEED))
    }
}

/// Recomputed group view (§4.2 "Group aggregation"). Never cached; callers
/// recompute at publish time from the current member slice.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate {
    pub power: PowerState,
    /// Max brightness among ON non-switch members; `None` if no member
    /// reports brightness.
    pub brightness: Option<u8>,
    /// Brightness-weighted mean Kelvin among temperature-capable members.
    pub temperature: Option<f64>,
}

/// Pure aggregation function over the current non-switch member slice (I4).
///
/// Tie-break for brightness (spec Open Question (b)): insertion order, i.e.
/// the first member in `members` wins ties for the maximum — see DESIGN.md.
pub fn aggregate(members: &[&Device]) -> GroupAggregate {
    let non_switch: Vec<&&Device> = members.iter().filter(|d| !d.is_switch).collect();

    let any_on = non_switch.iter().any(|d| d.state.power == PowerState::On);
    let any_known = non_switch
        .iter()
        .any(|d| d.state.power != PowerState::Unknown);
    let power = if any_on {
        PowerState::On
    } else if any_known {
        PowerState::Off
    } else {
        PowerState::Unknown
    };

    let brightness = non_switch
        .iter()
        .filter(|d| d.state.power == PowerState::On)
        .filter_map(|d| d.state.brightness.map(|b| (b, d.id)))
        .fold(None::<(u8, u8)>, |acc, (b, id)| match acc {
            // Strictly-greater comparison preserves first-seen on ties,
            // which is insertion order since `members` is iterated in order.
            Some((best, _)) if best >= b => acc,
            _ => Some((b, id)),
        })
        .map(|(b, _)| b);

    let temp_capable: Vec<&&Device> = non_switch
        .iter()
        .filter(|d| d.state.color_temp.is_some())
        .copied()
        .collect();
    let temperature = if temp_capable.is_empty() {
        None
    } else {
        let total_weight: f64 = temp_capable
            .iter()
            .map(|d| d.state.brightness.unwrap_or(0) as f64 + 1.0)
            .sum();
        let weighted: f64 = temp_capable
            .iter()
            .map(|d| {
                let w = d.state.brightness.unwrap_or(0) as f64 + 1.0;
                w * d.state.color_temp.unwrap() as f64
            })
            .sum();
        Some(weighted / total_weight)
    };

    GroupAggregate {
        power,
        brightness,
        temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, Device};

    fn bulb(id: u8, power: PowerState, brightness: Option<u8>) -> Device {
        let mut d = Device::new(id, 123, format!("Bulb {id}"));
        d.capabilities = Capabilities::ON_OFF | Capabilities::BRIGHTNESS;
        d.state.power = power;
        d.state.brightness = brightness;
        d
    }

    fn switch(id: u8, power: PowerState) -> Device {
        let mut d = Device::new(id, 123, format!("Switch {id}"));
        d.is_switch = true;
        d.capabilities = Capabilities::ON_OFF | Capabilities::SWITCH;
        d.state.power = power;
        d
    }

    #[test]
    fn aggregate_excludes_switches() {
        let bulb_on = bulb(4, PowerState::On, Some(80));
        let sw_off = switch(26, PowerState::Off);
        let members = vec![&bulb_on, &sw_off];
        let agg = aggregate(&members);
        assert_eq!(agg.power, PowerState::On);
    }

    #[test]
    fn aggregate_all_off_is_off() {
        let b1 = bulb(4, PowerState::Off, Some(0));
        let b2 = bulb(6, PowerState::Off, Some(0));
        let members = vec![&b1, &b2];
        assert_eq!(aggregate(&members).power, PowerState::Off);
    }

    #[test]
    fn aggregate_unknown_when_no_members_known() {
        let b1 = bulb(4, PowerState::Unknown, None);
        let members = vec![&b1];
        assert_eq!(aggregate(&members).power, PowerState::Unknown);
    }

    #[test]
    fn brightness_tie_break_is_insertion_order() {
        let b1 = bulb(4, PowerState::On, Some(80));
        let b2 = bulb(6, PowerState::On, Some(80));
        let members = vec![&b1, &b2];
        // Both report 80; the first in insertion order is authoritative,
        // which is unobservable here since the values are equal, but the
        // fold must not panic or flip on later equal candidates.
        assert_eq!(aggregate(&members).brightness, Some(80));
    }

    #[test]
    fn brightness_takes_max_among_on_members() {
        let b1 = bulb(4, PowerState::On, Some(40));
        let b2 = bulb(6, PowerState::On, Some(90));
        let members = vec![&b1, &b2];
        assert_eq!(aggregate(&members).brightness, Some(90));
    }

    #[test]
    fn is_fan_only_requires_all_members_fan_capable() {
        let mut fan = Device::new(9, 123, "Fan 9");
        fan.capabilities = Capabilities::FAN_SPEED;
        let bulb_on = bulb(4, PowerState::On, Some(10));
        let group = Group {
            id: 1,
            name: "Mixed".into(),
            member_ids: vec![4, 9],
        };
        assert!(!group.is_fan_only(&[&bulb_on, &fan]));
        assert!(group.is_fan_only(&[&fan]));
    }
}

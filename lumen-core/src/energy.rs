//! Energy policy: what the lights and AC should do given occupancy

use crate::room::DeviceState;

/// Apply the energy policy to `devices` for the given occupancy.
///
/// An occupied room gets its light switched on and leaves the AC as it was.
/// An empty room has both the light and the AC switched off.
///
/// Returns `true` if any device changed.
pub fn apply_energy_policy(devices: &mut DeviceState, occupied: bool) -> bool {
    let desired = desired_devices(*devices, occupied);
    let changed = desired != *devices;
    *devices = desired;
    changed
}

/// Desired device state without mutating anything
pub fn desired_devices(current: DeviceState, occupied: bool) -> DeviceState {
    if occupied {
        DeviceState {
            light: true,
            ac: current.ac,
        }
    } else {
        DeviceState {
            light: false,
            ac: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupied_turns_light_on_and_keeps_ac() {
        let mut devices = DeviceState { light: false, ac: false };
        assert!(apply_energy_policy(&mut devices, true));
        assert_eq!(devices, DeviceState { light: true, ac: false });

        let mut devices = DeviceState { light: false, ac: true };
        apply_energy_policy(&mut devices, true);
        assert_eq!(devices, DeviceState { light: true, ac: true });
    }

    #[test]
    fn test_empty_turns_everything_off() {
        let mut devices = DeviceState { light: true, ac: true };
        assert!(apply_energy_policy(&mut devices, false));
        assert_eq!(devices, DeviceState { light: false, ac: false });
    }

    #[test]
    fn test_no_change_reported() {
        let mut devices = DeviceState { light: false, ac: false };
        assert!(!apply_energy_policy(&mut devices, false));

        let mut devices = DeviceState { light: true, ac: false };
        assert!(!apply_energy_policy(&mut devices, true));
    }
}

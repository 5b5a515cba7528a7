//! Pointing the capture at the default sink's monitor.
//!
//! The sound server's ALSA plugin records from the client's default source,
//! which `PULSE_SOURCE` overrides for this process.

use std::env;

/// PulseAudio alias for the monitor of whichever sink is currently default.
pub const MONITOR_SOURCE: &str = "@DEFAULT_MONITOR@";

const SOURCE_VAR: &str = "PULSE_SOURCE";

/// ALSA PCMs that forward to the sound server, most preferred first.
const SOUND_SERVER_DEVICES: [&str; 2] = ["pulse", "pipewire"];

/// Route this process's recordings to the default monitor unless the user
/// already picked a source. Returns the source in effect.
///
/// Must run before any other thread is spawned.
pub fn route_default_monitor() -> String {
    match env::var(SOURCE_VAR) {
        Ok(source) if !source.is_empty() => source,
        _ => {
            env::set_var(SOURCE_VAR, MONITOR_SOURCE);
            MONITOR_SOURCE.to_string()
        }
    }
}

/// Position of the sound-server PCM among the input device `names`.
pub fn preferred_device(names: &[String]) -> Option<usize> {
    SOUND_SERVER_DEVICES
        .iter()
        .find_map(|wanted| names.iter().position(|name| name == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pulse_wins_over_pipewire() {
        let devices = names(&["default", "pipewire", "hw:CARD=PCH,DEV=0", "pulse"]);
        assert_eq!(preferred_device(&devices), Some(3));
    }

    #[test]
    fn falls_back_to_pipewire() {
        let devices = names(&["default", "pipewire"]);
        assert_eq!(preferred_device(&devices), Some(1));
    }

    #[test]
    fn raw_hardware_only_has_no_preference() {
        let devices = names(&["default", "hw:CARD=PCH,DEV=0", "pulseaudio-ish"]);
        assert_eq!(preferred_device(&devices), None);
    }

    #[test]
    fn user_chosen_source_is_kept() {
        // The only test in this crate that touches the variable.
        env::set_var(SOURCE_VAR, "alsa_output.usb.monitor");
        assert_eq!(route_default_monitor(), "alsa_output.usb.monitor");

        env::remove_var(SOURCE_VAR);
        assert_eq!(route_default_monitor(), MONITOR_SOURCE);
        assert_eq!(env::var(SOURCE_VAR).as_deref(), Ok(MONITOR_SOURCE));
        env::remove_var(SOURCE_VAR);
    }
}

//! Per-domain service tables
//!
//! Which service commands an entity depends on its domain: a switch is turned
//! on with `switch.turn_on`, a cover is opened with `cover.open_cover`, a
//! number is written with `number.set_value`, and so on. These tables are the
//! single place that knowledge lives.

/// Domains whose entities only report state and cannot be commanded
pub static READONLY_DOMAINS: &[&str] = &[
    "sensor",
    "binary_sensor",
    "weather",
    "device_tracker",
    "sun",
    "zone",
    "person",
    "event",
    "update",
];

/// Check if a domain is read-only (has no command services)
pub fn is_readonly_domain(domain: &str) -> bool {
    READONLY_DOMAINS.contains(&domain)
}

/// Service that switches an entity of `domain` on
pub fn turn_on_service(domain: &str) -> &'static str {
    match domain {
        "cover" => "open_cover",
        "lock" => "unlock",
        "valve" => "open_valve",
        _ => "turn_on",
    }
}

/// Service that switches an entity of `domain` off
pub fn turn_off_service(domain: &str) -> &'static str {
    match domain {
        "cover" => "close_cover",
        "lock" => "lock",
        "valve" => "close_valve",
        _ => "turn_off",
    }
}

/// Service and data key that write a numeric value to an entity of `domain`
pub fn set_value_service(domain: &str) -> Option<(&'static str, &'static str)> {
    match domain {
        "number" | "input_number" => Some(("set_value", "value")),
        "climate" | "water_heater" => Some(("set_temperature", "temperature")),
        "fan" => Some(("set_percentage", "percentage")),
        "humidifier" => Some(("set_humidity", "humidity")),
        "light" => Some(("turn_on", "brightness_pct")),
        "cover" => Some(("set_cover_position", "position")),
        _ => None,
    }
}

/// Service and data that pick `option` on an entity of `domain`
///
/// Alarm panels have one service per target state instead of an option
/// argument, so the option selects the service and the data is empty.
pub fn select_option_service(
    domain: &str,
    option: &str,
) -> Option<(&'static str, serde_json::Value)> {
    match domain {
        "select" | "input_select" => {
            Some(("select_option", serde_json::json!({ "option": option })))
        }
        "fan" => Some(("set_direction", serde_json::json!({ "direction": option }))),
        "alarm_control_panel" => {
            let service = match option {
                "disarmed" => "alarm_disarm",
                "armed_home" => "alarm_arm_home",
                "armed_away" => "alarm_arm_away",
                "armed_night" => "alarm_arm_night",
                "triggered" => "alarm_trigger",
                _ => return None,
            };
            Some((service, serde_json::json!({})))
        }
        _ => None,
    }
}

//! Built-in action table.
//!
//! Order matters: detection picks the first action with a matching keyword,
//! so more specific phrases come before generic ones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parley_core::capability::{ActionContext, CapabilityRegistry};
use parley_core::error::ActionError;
use serde_json::Value;

use crate::action::{Action, CORE_CAPABILITY, CapabilityAction};

/// The default actions, in detection order.
pub fn builtin_actions() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(CurrentTimeAction::new()),
        Arc::new(CapabilityAction::new(
            "speed_test",
            "Measure internet download/upload speed",
            &["speed test", "speedtest", "internet speed", "how fast is the internet"],
            "speedtest",
            format_speed_test,
        )),
        Arc::new(CapabilityAction::new(
            "device_list",
            "List devices connected to the local network",
            &["devices", "device list", "who's online", "what's on the network", "connected"],
            "network",
            format_device_list,
        )),
        Arc::new(CapabilityAction::new(
            "weather",
            "Current weather and forecast",
            &["weather", "forecast", "is it raining", "temperature outside"],
            "weather",
            format_weather,
        )),
        Arc::new(CapabilityAction::new(
            "lights",
            "Turn lights on or off",
            &["lights", "light", "lamp"],
            "home_assistant",
            format_lights,
        )),
    ]
}

/// Answers from the local clock; needs no external capability.
pub struct CurrentTimeAction {
    keywords: Vec<String>,
}

impl CurrentTimeAction {
    pub fn new() -> Self {
        Self {
            keywords: ["what time", "current time", "time is it"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl Default for CurrentTimeAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for CurrentTimeAction {
    fn id(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Tell the current time"
    }

    fn keywords(&self) -> &[String] {
        &self.keywords
    }

    fn required_capability(&self) -> &str {
        CORE_CAPABILITY
    }

    async fn execute(
        &self,
        _context: &ActionContext,
        _capabilities: &dyn CapabilityRegistry,
    ) -> Result<Value, ActionError> {
        let now = Utc::now();
        Ok(serde_json::json!({
            "timestamp": now.to_rfc3339(),
            "time": now.format("%H:%M").to_string(),
            "date": now.format("%Y-%m-%d").to_string(),
        }))
    }

    fn format_result(&self, result: &Value) -> String {
        match (result["time"].as_str(), result["date"].as_str()) {
            (Some(time), Some(date)) => format!("It's {time} UTC on {date}."),
            _ => "I couldn't read the clock.".to_string(),
        }
    }
}

fn format_device_list(result: &Value) -> String {
    let Some(devices) = result["devices"].as_array() else {
        return "No device information returned.".to_string();
    };
    if devices.is_empty() {
        return "No devices found on the network.".to_string();
    }

    let mut out = format!("Found {} device(s):", devices.len());
    for device in devices {
        let name = device["name"].as_str().unwrap_or("unknown");
        match device["ip"].as_str() {
            Some(ip) => out.push_str(&format!("\n- {name} ({ip})")),
            None => out.push_str(&format!("\n- {name}")),
        }
    }
    out
}

fn format_speed_test(result: &Value) -> String {
    let num = |key: &str| result[key].as_f64().map(|v| format!("{v:.1}"));
    match (num("download_mbps"), num("upload_mbps")) {
        (Some(down), Some(up)) => {
            let mut out = format!("Download: {down} Mbps, Upload: {up} Mbps");
            if let Some(ping) = num("ping_ms") {
                out.push_str(&format!(", Ping: {ping} ms"));
            }
            out
        }
        _ => "Speed test returned no measurements.".to_string(),
    }
}

fn format_weather(result: &Value) -> String {
    let location = result["location"].as_str().unwrap_or("Outside");
    let conditions = result["conditions"].as_str().unwrap_or("unknown conditions");
    match result["temperature"].as_f64() {
        Some(t) => format!("{location}: {t:.0}°, {conditions}"),
        None => format!("{location}: {conditions}"),
    }
}

fn format_lights(result: &Value) -> String {
    if let Some(message) = result["message"].as_str() {
        return message.to_string();
    }
    match result["state"].as_str() {
        Some(state) => format!("Lights are now {state}."),
        None => "Done.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::capability::NoCapabilities;
    use serde_json::json;

    #[test]
    fn table_ids_are_unique() {
        let actions = builtin_actions();
        let mut ids: Vec<&str> = actions.iter().map(|a| a.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), actions.len());
        assert!(ids.contains(&"current_time"));
    }

    #[test]
    fn only_current_time_uses_core() {
        for action in builtin_actions() {
            assert_eq!(
                action.required_capability() == CORE_CAPABILITY,
                action.id() == "current_time"
            );
        }
    }

    #[tokio::test]
    async fn current_time_runs_without_capabilities() {
        let action = CurrentTimeAction::new();
        let raw = action
            .execute(&ActionContext::new("what time is it"), &NoCapabilities)
            .await
            .unwrap();
        let text = action.format_result(&raw);
        assert!(text.starts_with("It's "));
        assert!(text.ends_with('.'));
    }

    #[test]
    fn device_list_formatting() {
        let raw = json!({ "devices": [
            { "name": "nas", "ip": "192.168.1.10" },
            { "name": "printer" }
        ]});
        assert_eq!(
            format_device_list(&raw),
            "Found 2 device(s):\n- nas (192.168.1.10)\n- printer"
        );
        assert_eq!(format_device_list(&json!({ "devices": [] })), "No devices found on the network.");
        assert_eq!(format_device_list(&json!({})), "No device information returned.");
    }

    #[test]
    fn speed_test_formatting() {
        let raw = json!({ "download_mbps": 512.34, "upload_mbps": 48.0, "ping_ms": 9.0 });
        assert_eq!(format_speed_test(&raw), "Download: 512.3 Mbps, Upload: 48.0 Mbps, Ping: 9.0 ms");
        assert_eq!(format_speed_test(&json!({})), "Speed test returned no measurements.");
    }

    #[test]
    fn weather_and_lights_formatting() {
        let raw = json!({ "location": "Oslo", "temperature": 3.4, "conditions": "light snow" });
        assert_eq!(format_weather(&raw), "Oslo: 3°, light snow");
        assert_eq!(format_lights(&json!({ "state": "off" })), "Lights are now off.");
        assert_eq!(format_lights(&json!({ "message": "Dimmed to 30%" })), "Dimmed to 30%");
    }
}

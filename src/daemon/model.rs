use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::model::{TrackedField, Value};
use crate::events::TickValue;

fn default_event_buffer_size() -> usize {
    1000
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub archive_file: PathBuf,
    pub event_file: PathBuf,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    #[serde(with = "humantime_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,

    #[serde(default)]
    pub variables: Vec<TrackedField>,
    #[serde(default)]
    pub calculation_elements: Vec<TrackedField>,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        let mut error_string = String::new();

        if self.event_buffer_size == 0 {
            error_string += "\tEvent buffer size must be greater than 0\n";
        }

        if self.archive_file == self.event_file {
            error_string += &format!(
                "\tArchive and event file can't be the same ({})\n",
                self.archive_file.to_string_lossy()
            );
        }

        let mut name_set = HashSet::new();
        let mut repeated_set = HashSet::new();

        for field in self.variables.iter().chain(&self.calculation_elements) {
            if !name_set.insert(field.id.clone()) && repeated_set.insert(field.id.clone()) {
                error_string += &format!(
                    "\tRepeated field ids: {} was defined more than once\n",
                    field.id
                );
            }
        }

        if error_string.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(error_string))
        }
    }
}

/// Checks every device and reports all problems at once.
pub fn validate_config(config: &[DeviceConfig]) -> Result<()> {
    let mut error_string = String::new();
    let mut device_ids = HashSet::new();

    for device in config {
        if !device_ids.insert(device.id.clone()) {
            error_string += &format!("Repeated device id: {}\n", device.id);
        }

        if let Err(err) = device.validate() {
            error_string += &format!("{}:\n{}", device.id, err);
        }
    }

    if error_string.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(error_string))
    }
}

/// What producers hand to the historian, one per line on stdin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistorianMessage {
    Sample {
        device: String,
        date: i64,
        values: HashMap<String, Value>,
    },
    Events {
        device: String,
        events: Vec<TickValue>,
    },
}

impl HistorianMessage {
    pub fn device(&self) -> &str {
        match self {
            HistorianMessage::Sample { device, .. } | HistorianMessage::Events { device, .. } => {
                device
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::model::ValueType;

    const CONFIG: &str = r#"[
        {
            "id": "press_1",
            "archive_file": "press_1.db3",
            "event_file": "press_1_events.db3",
            "busy_timeout": "2s",
            "variables": [
                {"id": "speed", "value_type": "float"},
                {"id": "running", "value_type": "boolean"}
            ],
            "calculation_elements": [
                {"id": "total", "value_type": "integer"}
            ]
        }
    ]"#;

    #[test]
    fn test_config_parsing() {
        let config: Vec<DeviceConfig> = serde_json::from_str(CONFIG).unwrap();
        let device = &config[0];

        assert_eq!(device.event_buffer_size, 1000);
        assert_eq!(device.busy_timeout, Duration::from_secs(2));
        assert_eq!(
            device.calculation_elements,
            vec![TrackedField::new("total", ValueType::Integer)]
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let mut config: Vec<DeviceConfig> = serde_json::from_str(CONFIG).unwrap();
        config[0]
            .calculation_elements
            .push(TrackedField::new("speed", ValueType::Float));
        config[0].event_buffer_size = 0;
        config.push(config[0].clone());

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("Repeated device id: press_1"));
        assert!(err.contains("speed was defined more than once"));
        assert!(err.contains("greater than 0"));
    }

    #[test]
    fn test_message_parsing() {
        let message: HistorianMessage = serde_json::from_str(
            r#"{"kind": "sample", "device": "press_1", "date": 10, "values": {"speed": 1.5}}"#,
        )
        .unwrap();
        assert_eq!(message.device(), "press_1");

        let message: HistorianMessage = serde_json::from_str(
            r#"{"kind": "events", "device": "press_1", "events": [{"tick_id": 3, "value": 1}]}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            HistorianMessage::Events {
                device: "press_1".to_string(),
                events: vec![TickValue {
                    tick_id: 3,
                    value: 1
                }],
            }
        );
    }
}

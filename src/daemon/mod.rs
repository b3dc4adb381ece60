//! Wiring between producers and the per-device stores.
//!
//! A [`Historian`] is built once from configuration and handed to whoever needs
//! it; there is no process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, info_span};

use crate::archive::ValueStore;
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::events::{BufferedEvent, EventRingBuffer};

pub mod model;

pub use model::{validate_config, DeviceConfig, HistorianMessage};

pub struct DeviceStores {
    pub values: Arc<ValueStore>,
    pub events: Arc<EventRingBuffer>,
}

impl DeviceStores {
    /// Opens both stores and registers every configured field. Fields already
    /// present in the file from an earlier run reuse their columns.
    pub fn open(config: &DeviceConfig) -> ArchiveResult<Self> {
        let _span = info_span!("device", id = %config.id).entered();

        let values = ValueStore::with_busy_timeout(config.busy_timeout);
        values.init(&config.archive_file)?;

        for field in &config.variables {
            values.add_variable(field.clone())?;
        }
        for field in &config.calculation_elements {
            values.add_calculation_element(field.clone())?;
        }

        let events = EventRingBuffer::with_busy_timeout(config.busy_timeout);
        events.init(&config.event_file, config.event_buffer_size)?;

        info!(
            "Tracking {} variables and {} calculation elements",
            config.variables.len(),
            config.calculation_elements.len()
        );

        Ok(DeviceStores {
            values: Arc::new(values),
            events: Arc::new(events),
        })
    }
}

pub struct Historian {
    devices: HashMap<String, DeviceStores>,
}

impl Historian {
    pub fn from_config(config: &[DeviceConfig]) -> ArchiveResult<Self> {
        let mut devices = HashMap::new();

        for device in config {
            devices.insert(device.id.clone(), DeviceStores::open(device)?);
        }

        Ok(Historian { devices })
    }

    pub fn device(&self, id: &str) -> Option<&DeviceStores> {
        self.devices.get(id)
    }

    /// Applies one message. Returns the events that were newly stored, which is
    /// always empty for samples.
    pub fn handle(&self, message: HistorianMessage) -> ArchiveResult<Vec<BufferedEvent>> {
        let device = self
            .device(message.device())
            .ok_or_else(|| ArchiveError::NotFound(message.device().to_string()))?;

        match message {
            HistorianMessage::Sample { date, values, .. } => {
                device.values.insert_values(date, &values)?;
                Ok(vec![])
            }
            HistorianMessage::Events { events, .. } => device.events.refresh_events(&events),
        }
    }

    /// Drains the channel until every sender is gone. A failed message is
    /// logged and skipped, the next tick is still processed.
    pub async fn listen(self: Arc<Self>, mut rx: Receiver<HistorianMessage>) {
        debug!("Historian started listening");

        while let Some(message) = rx.recv().await {
            let historian = self.clone();
            let device = message.device().to_string();

            let result = tokio::task::spawn_blocking(move || historian.handle(message)).await;

            match result {
                Ok(Ok(stored)) if !stored.is_empty() => {
                    debug!("Device {} stored {} events", device, stored.len());
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => error!("Error storing message for device {}: {}", device, err),
                Err(err) => error!("Storage task for device {} failed: {}", device, err),
            }
        }

        info!("Historian channel closed, stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::model::{TrackedField, Value, ValueType};
    use crate::events::TickValue;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn device_config(dir: &Path) -> DeviceConfig {
        DeviceConfig {
            id: "press_1".to_string(),
            archive_file: dir.join("press_1.db3"),
            event_file: dir.join("press_1_events.db3"),
            event_buffer_size: 4,
            busy_timeout: Duration::from_secs(1),
            variables: vec![TrackedField::new("speed", ValueType::Float)],
            calculation_elements: vec![TrackedField::new("total", ValueType::Integer)],
        }
    }

    fn sample(date: i64, speed: f64) -> HistorianMessage {
        HistorianMessage::Sample {
            device: "press_1".to_string(),
            date,
            values: HashMap::from([("speed".to_string(), Value::FloatingPoint(speed))]),
        }
    }

    #[test]
    fn test_handle_routes_messages() {
        let dir = tempdir().unwrap();
        let historian = Historian::from_config(&[device_config(dir.path())]).unwrap();

        assert!(historian.handle(sample(10, 1.5)).unwrap().is_empty());

        let stored = historian
            .handle(HistorianMessage::Events {
                device: "press_1".to_string(),
                events: vec![TickValue {
                    tick_id: 10,
                    value: 3,
                }],
            })
            .unwrap();
        assert_eq!(stored.len(), 1);

        let device = historian.device("press_1").unwrap();
        let archived = device.values.get_value(11, "speed").unwrap().unwrap();
        assert_eq!(archived.value, Some(Value::FloatingPoint(1.5)));

        let err = historian
            .handle(HistorianMessage::Events {
                device: "press_2".to_string(),
                events: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(id) if id == "press_2"));
    }

    #[test]
    fn test_restart_reuses_stores() {
        let dir = tempdir().unwrap();
        let config = [device_config(dir.path())];

        {
            let historian = Historian::from_config(&config).unwrap();
            historian.handle(sample(10, 1.5)).unwrap();
        }

        let historian = Historian::from_config(&config).unwrap();
        let device = historian.device("press_1").unwrap();
        assert!(device.values.get_value(10, "speed").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_listen_skips_failed_messages() {
        let dir = tempdir().unwrap();
        let historian = Arc::new(Historian::from_config(&[device_config(dir.path())]).unwrap());
        let (tx, rx) = mpsc::channel(16);

        let listener = tokio::spawn(historian.clone().listen(rx));

        tx.send(sample(10, 1.0)).await.unwrap();
        // Same date again, rejected by the primary key and skipped
        tx.send(sample(10, 2.0)).await.unwrap();
        tx.send(sample(20, 3.0)).await.unwrap();
        drop(tx);

        listener.await.unwrap();

        let device = historian.device("press_1").unwrap();
        let at = |date| device.values.get_value(date, "speed").unwrap().unwrap().value;
        assert_eq!(at(15), Some(Value::FloatingPoint(1.0)));
        assert_eq!(at(25), Some(Value::FloatingPoint(3.0)));
    }
}

//! In-memory transport and sinks for driving the bridge in tests

#![allow(dead_code)]

use potbridge::bridge::{
    Connector, JoystickSink, JoystickState, KeyError, KeySink, SinkError, Transport,
    TransportError,
};
use potbridge::config::{BridgeConfig, SerialConfig, SwitchFilterConfig};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Recorder {
    pub updates: Vec<JoystickState>,
    pub taps: Vec<String>,
    pub transport_opened: bool,
    pub transport_closed: bool,
}

/// Knobs for the failures a test wants to provoke
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub joystick_open: bool,
    pub transport_open: bool,
    /// Joystick updates fail once this many succeeded
    pub updates_after: Option<usize>,
    pub keys: bool,
    /// Reads fail once the queued chunks are used up
    pub reads_when_drained: bool,
}

#[derive(Clone, Default)]
pub struct Harness {
    pub recorder: Arc<Mutex<Recorder>>,
    pub chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
    pub faults: Faults,
    /// Simulated read timeout when no bytes are queued
    pub idle_read: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Queues one chunk; each transport read returns at most one chunk
    pub fn push(&self, bytes: impl Into<Vec<u8>>) {
        self.chunks.lock().unwrap().push_back(bytes.into());
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(MockConnector {
            harness: self.clone(),
        })
    }

    pub fn updates(&self) -> Vec<JoystickState> {
        self.recorder.lock().unwrap().updates.clone()
    }

    pub fn last_update(&self) -> Option<JoystickState> {
        self.recorder.lock().unwrap().updates.last().copied()
    }

    pub fn taps(&self) -> Vec<String> {
        self.recorder.lock().unwrap().taps.clone()
    }

    pub fn transport_opened(&self) -> bool {
        self.recorder.lock().unwrap().transport_opened
    }

    pub fn transport_closed(&self) -> bool {
        self.recorder.lock().unwrap().transport_closed
    }
}

struct MockConnector {
    harness: Harness,
}

impl Connector for MockConnector {
    fn open_joystick(&mut self, device_id: u32) -> Result<Box<dyn JoystickSink>, SinkError> {
        if self.harness.faults.joystick_open {
            return Err(SinkError::Open {
                device_id,
                reason: "driver not installed".to_string(),
            });
        }
        Ok(Box::new(MockJoystick {
            harness: self.harness.clone(),
        }))
    }

    fn open_transport(
        &mut self,
        serial: &SerialConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        if self.harness.faults.transport_open {
            return Err(TransportError::Open {
                port: serial.port.clone(),
                reason: "no such device".to_string(),
            });
        }
        self.harness.recorder.lock().unwrap().transport_opened = true;
        Ok(Box::new(MockTransport {
            harness: self.harness.clone(),
        }))
    }

    fn open_keys(&mut self) -> Box<dyn KeySink> {
        Box::new(MockKeys {
            harness: self.harness.clone(),
        })
    }
}

struct MockJoystick {
    harness: Harness,
}

impl JoystickSink for MockJoystick {
    fn update(&mut self, state: &JoystickState) -> Result<(), SinkError> {
        let mut recorder = self.harness.recorder.lock().unwrap();
        if let Some(limit) = self.harness.faults.updates_after {
            if recorder.updates.len() >= limit {
                return Err(SinkError::Update("device unplugged".to_string()));
            }
        }
        recorder.updates.push(*state);
        Ok(())
    }
}

struct MockKeys {
    harness: Harness,
}

impl KeySink for MockKeys {
    fn tap(&mut self, key: &str) -> Result<(), KeyError> {
        if self.harness.faults.keys {
            return Err(KeyError {
                key: key.to_string(),
                reason: "input injection denied".to_string(),
            });
        }
        self.harness.recorder.lock().unwrap().taps.push(key.to_string());
        Ok(())
    }
}

struct MockTransport {
    harness: Harness,
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let next = self.harness.chunks.lock().unwrap().pop_front();
        match next {
            Some(chunk) => {
                let count = chunk.len().min(buf.len());
                buf[..count].copy_from_slice(&chunk[..count]);
                if count < chunk.len() {
                    self.harness
                        .chunks
                        .lock()
                        .unwrap()
                        .push_front(chunk[count..].to_vec());
                }
                Ok(count)
            }
            None if self.harness.faults.reads_when_drained => Err(TransportError::Read(
                io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"),
            )),
            None => {
                if !self.harness.idle_read.is_zero() {
                    std::thread::sleep(self.harness.idle_read);
                }
                Ok(0)
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.harness.recorder.lock().unwrap().transport_closed = true;
    }
}

/// Defaults with a pass-through switch filter so edges land on the frame
/// that carries them
pub fn instant_switch_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.switch_filter = SwitchFilterConfig {
        window: 1,
        off_threshold: 5,
        on_threshold: 10,
        debounce_ms: 0,
        sticky_ms: 0,
    };
    config
}

pub fn text_frame(pots: [u8; 8], switch_1: u8, switch_2: u8) -> Vec<u8> {
    let mut fields: Vec<String> = pots.iter().map(|p| p.to_string()).collect();
    fields.push(switch_1.to_string());
    fields.push(switch_2.to_string());
    format!("{}\n", fields.join(",")).into_bytes()
}

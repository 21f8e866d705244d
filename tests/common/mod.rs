//! Scripted stand-in for a Z-Wave controller on the far end of a duplex pipe.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use zwave_controller::protocol::{FrameBuffer, FrameType};
use zwave_controller::{ClassCatalog, Controller, ControllerBuilder, DataFrame, Frame, FunctionId};

/// Catalog with one generic/specific device pair and two command classes.
pub const CATALOG: &str = r#"{
    "basic_devices": [{"key": 4, "name": "ROUTING_SLAVE", "help": "Routing Slave"}],
    "generic_devices": [{
        "key": 16, "name": "SWITCH_BINARY", "help": "Binary Switch",
        "specific_devices": [{"key": 1, "name": "POWER_SWITCH_BINARY", "help": "Binary Power Switch"}]
    }],
    "command_classes": [
        {"key": 32, "name": "COMMAND_CLASS_BASIC", "help": "Basic",
         "commands": [{"key": 1, "name": "BASIC_SET"}, {"key": 2, "name": "BASIC_GET"}]},
        {"key": 37, "name": "COMMAND_CLASS_SWITCH_BINARY", "help": "Binary Switch",
         "commands": [{"key": 1, "name": "SWITCH_BINARY_SET"}]}
    ]
}"#;

pub fn catalog() -> ClassCatalog {
    ClassCatalog::from_json_str(CATALOG).unwrap()
}

/// Connect a controller built from `builder` to a fresh fake device.
pub fn connect_with(builder: ControllerBuilder) -> (Controller, FakeDevice) {
    let (host, device) = duplex(4096);
    (builder.connect(host), FakeDevice::new(device))
}

pub fn connect() -> (Controller, FakeDevice) {
    connect_with(Controller::builder().registry(catalog()))
}

/// The device side of the pipe.
pub struct FakeDevice {
    stream: DuplexStream,
    buffer: FrameBuffer,
    pending: Vec<Frame>,
    started: Instant,
}

impl FakeDevice {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            buffer: FrameBuffer::new(),
            pending: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Time since the device was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Next frame written by the host, of any kind.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            if !self.pending.is_empty() {
                return self.pending.remove(0);
            }
            let mut buf = [0u8; 256];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "host closed the pipe");
            self.pending.extend(self.buffer.push(&buf[..n]));
        }
    }

    /// Next data frame written by the host. ACKs in between are skipped.
    pub async fn next_request(&mut self) -> DataFrame {
        loop {
            match self.next_frame().await {
                Frame::Ack => continue,
                Frame::Data(frame) => return frame,
                other => panic!("unexpected frame from host: {}", other),
            }
        }
    }

    /// Next data frame, which must be a request for `function`. The device
    /// ACKs it before returning.
    pub async fn expect_request(&mut self, function: FunctionId) -> DataFrame {
        let frame = self.next_request().await;
        assert_eq!(frame.function(), function, "unexpected request {}", frame);
        assert_eq!(frame.kind(), FrameType::Request);
        assert!(frame.is_checksum_valid());
        self.write(&Frame::Ack).await;
        frame
    }

    /// Next frame, which must be the host's ACK for something the device sent.
    pub async fn expect_ack(&mut self) {
        match self.next_frame().await {
            Frame::Ack => {}
            other => panic!("expected ACK, got {}", other),
        }
    }

    pub async fn respond(&mut self, function: FunctionId, payload: &[u8]) {
        self.write(&Frame::Data(DataFrame::response(function, payload).unwrap()))
            .await;
    }

    /// Send an unsolicited request-kind frame (a callback or an update).
    pub async fn callback(&mut self, function: FunctionId, payload: &[u8]) {
        self.write(&Frame::Data(DataFrame::request(function, payload).unwrap()))
            .await;
    }

    pub async fn write(&mut self, frame: &Frame) {
        self.write_raw(&frame.encode()).await;
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

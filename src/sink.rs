// Sink Module - Pixel output targets behind the set/show contract
//
// The engine only ever calls set_pixel_color() for changed LEDs followed by
// one show() per changed frame. Everything behind that boundary (real DDP
// hardware, a mock, a visualizer) is interchangeable.
use anyhow::{anyhow, Result};
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};

use crate::color::unpack_color;

pub trait PixelSink: Send {
    fn len(&self) -> usize;
    fn set_pixel_color(&mut self, index: usize, color: u32);
    fn show(&mut self) -> Result<()>;
}

/// Channel order on the wire. WS281x strips are usually GRB; DDP/WLED
/// setups normally take RGB and reorder on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Grb,
}

/// DDP output to a WLED-style device over UDP.
pub struct DdpSink {
    connection: DDPConnection,
    frame: Vec<u8>,
    order: ChannelOrder,
}

impl DdpSink {
    pub fn connect(ip: &str, led_count: usize, order: ChannelOrder) -> Result<Self> {
        let dest_addr = format!("{}:4048", ip);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let connection = DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)?;
        Ok(DdpSink {
            connection,
            frame: vec![0u8; led_count * 3],
            order,
        })
    }
}

impl PixelSink for DdpSink {
    fn len(&self) -> usize {
        self.frame.len() / 3
    }

    fn set_pixel_color(&mut self, index: usize, color: u32) {
        if index >= self.len() {
            return;
        }
        let (r, g, b) = unpack_color(color);
        let base = index * 3;
        match self.order {
            ChannelOrder::Rgb => {
                self.frame[base] = r;
                self.frame[base + 1] = g;
                self.frame[base + 2] = b;
            }
            ChannelOrder::Grb => {
                self.frame[base] = g;
                self.frame[base + 1] = r;
                self.frame[base + 2] = b;
            }
        }
    }

    fn show(&mut self) -> Result<()> {
        self.connection
            .write(&self.frame)
            .map_err(|e| anyhow!("DDP send failed: {}", e))?;
        Ok(())
    }
}

/// Shared inspection state for the mock sink.
#[derive(Debug, Default)]
pub struct MockState {
    pub pixels: Vec<u32>,
    pub shows: usize,
    /// Every set_pixel_color call in order, for write-interleaving checks.
    pub writes: Vec<(usize, u32)>,
}

/// In-memory sink for tests and headless runs. Cloning shares the state so
/// tests can inspect writes after the sink moved into the render thread.
#[derive(Clone)]
pub struct MockSink {
    state: Arc<Mutex<MockState>>,
    len: usize,
}

impl MockSink {
    pub fn new(led_count: usize) -> Self {
        MockSink {
            state: Arc::new(Mutex::new(MockState {
                pixels: vec![0; led_count],
                shows: 0,
                writes: Vec::new(),
            })),
            len: led_count,
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }
}

impl PixelSink for MockSink {
    fn len(&self) -> usize {
        self.len
    }

    fn set_pixel_color(&mut self, index: usize, color: u32) {
        let mut state = self.state.lock().unwrap();
        if index < state.pixels.len() {
            state.pixels[index] = color;
            state.writes.push((index, color));
        }
    }

    fn show(&mut self) -> Result<()> {
        self.state.lock().unwrap().shows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::pack_color;

    #[test]
    fn test_mock_sink_records_writes() {
        let mut sink = MockSink::new(4);
        sink.set_pixel_color(2, pack_color(1, 2, 3));
        sink.set_pixel_color(9, pack_color(9, 9, 9)); // out of range, ignored
        sink.show().unwrap();

        let state = sink.state();
        let state = state.lock().unwrap();
        assert_eq!(state.pixels[2], pack_color(1, 2, 3));
        assert_eq!(state.writes.len(), 1);
        assert_eq!(state.shows, 1);
    }
}

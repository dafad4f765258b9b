// crates/most-ctrl-linux/src/lib.rs
#![cfg(target_os = "linux")]

use most_ctrl::{CoreError, InicChannel, NodeAddress, PositionAddress};
use pnet::datalink::{self, Channel, NetworkInterface as PnetInterface};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

/// Wire opcode tags for the minimal INIC command framing this driver speaks. The
/// specification treats command content as opaque above the transport; this is this driver's
/// own encoding, not a standardized MOST wire format.
mod opcode {
    pub const HELLO_GET: u8 = 0x01;
    pub const WELCOME_START_RESULT: u8 = 0x02;
    pub const SIGNATURE_GET: u8 = 0x03;
    pub const EXC_INIT: u8 = 0x04;
    pub const BROADCAST_INIT: u8 = 0x05;
    pub const BUILD_RESOURCES: u8 = 0x06;
    pub const ATD_START: u8 = 0x07;
    pub const ATD_SET_MAX_POSITION: u8 = 0x08;
}

/// A decoded inbound frame, ready to feed into `NodeDiscovery`'s `on_*` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InicEvent {
    HelloStatus {
        node_address: NodeAddress,
        node_position_address: PositionAddress,
    },
    WelcomeResult {
        ok: bool,
    },
    SignatureResult {
        ok: bool,
    },
}

/// `InicChannel` over a raw Ethernet device, in the same `pnet::datalink` + `Mutex` shape the
/// teacher crate used for its own link-layer driver.
pub struct LinuxPnetChannel {
    tx: Mutex<Box<dyn datalink::DataLinkSender>>,
    rx: Mutex<Box<dyn datalink::DataLinkReceiver>>,
    pnet_iface: PnetInterface,
    mac_address: [u8; 6],
}

impl LinuxPnetChannel {
    pub fn new(interface_name: &str) -> Result<Self, String> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface: &PnetInterface| iface.name == interface_name)
            .ok_or_else(|| format!("Interface '{}' not found", interface_name))?;

        let mac_address = interface.mac.ok_or("Interface has no MAC address")?.into();

        let config = datalink::Config {
            read_timeout: Some(Duration::from_millis(100)),
            promiscuous: true,
            ..Default::default()
        };

        let (tx, rx) = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err("Unsupported channel type".to_string()),
            Err(e) => return Err(e.to_string()),
        };

        Ok(Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            pnet_iface: interface,
            mac_address,
        })
    }

    /// Sets the read timeout for the underlying channel. pnet fixes its config at creation
    /// time, so this re-creates the channel.
    pub fn set_read_timeout(&mut self, duration: Duration) -> Result<(), CoreError> {
        let config = datalink::Config {
            read_timeout: Some(duration),
            promiscuous: true,
            ..Default::default()
        };
        match datalink::channel(&self.pnet_iface, config) {
            Ok(Channel::Ethernet(tx, rx)) => {
                *self.tx.lock().unwrap() = tx;
                *self.rx.lock().unwrap() = rx;
                Ok(())
            }
            Ok(_) => Err(CoreError::Io("unsupported channel type")),
            Err(_) => Err(CoreError::Io("failed to set read timeout")),
        }
    }

    pub fn local_mac_address(&self) -> [u8; 6] {
        self.mac_address
    }

    fn send(&self, opcode: u8, payload: &[u8]) {
        let mut frame = vec![0u8; 1 + payload.len()];
        frame[0] = opcode;
        frame[1..].copy_from_slice(payload);
        let _ = self.tx.lock().unwrap().send_to(&frame, None);
    }

    /// Reads and decodes the next frame, if any arrived within the configured timeout.
    /// Returns `Ok(None)` on a read timeout (not an error — same convention the teacher's
    /// driver used for `receive_frame`).
    pub fn poll(&self) -> Result<Option<InicEvent>, CoreError> {
        let mut rx = self.rx.lock().unwrap();
        match rx.next() {
            Ok(frame) => Ok(decode(frame)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(_) => Err(CoreError::Io("receive failed")),
        }
    }
}

fn decode(frame: &[u8]) -> Option<InicEvent> {
    let (&tag, rest) = frame.split_first()?;
    match tag {
        0x80 if rest.len() >= 4 => Some(InicEvent::HelloStatus {
            node_address: NodeAddress(u16::from_be_bytes([rest[0], rest[1]])),
            node_position_address: PositionAddress(u16::from_be_bytes([rest[2], rest[3]])),
        }),
        0x81 if !rest.is_empty() => Some(InicEvent::WelcomeResult { ok: rest[0] != 0 }),
        0x82 if !rest.is_empty() => Some(InicEvent::SignatureResult { ok: rest[0] != 0 }),
        _ => None,
    }
}

impl InicChannel for LinuxPnetChannel {
    fn send_hello_get(&mut self, signature_version: u8) {
        self.send(opcode::HELLO_GET, &[signature_version]);
    }

    fn send_welcome_start_result(&mut self, target: PositionAddress, signature_version: u8) {
        let t = target.0.to_be_bytes();
        self.send(opcode::WELCOME_START_RESULT, &[t[0], t[1], signature_version]);
    }

    fn send_signature_get(&mut self, target: NodeAddress, signature_version: u8) {
        let t = target.0.to_be_bytes();
        self.send(opcode::SIGNATURE_GET, &[t[0], t[1], signature_version]);
    }

    fn send_exc_init(&mut self, target: PositionAddress) {
        let t = target.0.to_be_bytes();
        self.send(opcode::EXC_INIT, &t);
    }

    fn broadcast_init(&mut self) {
        self.send(opcode::BROADCAST_INIT, &[]);
    }

    fn build_resources(&mut self, node: NodeAddress, index: u16) {
        let n = node.0.to_be_bytes();
        let i = index.to_be_bytes();
        self.send(opcode::BUILD_RESOURCES, &[n[0], n[1], i[0], i[1]]);
    }

    fn atd_start(&mut self, route: most_ctrl::RouteId) {
        let r = route.0.to_be_bytes();
        self.send(opcode::ATD_START, &r);
    }

    fn atd_set_max_position(&mut self, max_position: u16) {
        let m = max_position.to_be_bytes();
        self.send(opcode::ATD_SET_MAX_POSITION, &m);
    }
}

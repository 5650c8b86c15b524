//! src/net/wake_on_lan.rs
//! ============================================================
//! Magic-packet wake-up over UDP broadcast.
//!
//! Packet layout (102 bytes):
//!   [0..6)    0xFF × 6
//!   [6..102)  MAC address × 16

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
    str::FromStr,
    sync::OnceLock,
};

use compact_str::CompactString;
use get_if_addrs::{IfAddr, Interface};
use regex::Regex;
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument};

use crate::config::WakeConfig;
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_PORT: u16 = 9;
pub const PACKET_LEN: usize = 6 + 16 * 6;

const MAC_PATTERN: &str = r"^([0-9a-fA-F]{2}[-:]){5}[0-9a-fA-F]{2}$";

fn mac_rule() -> CoreResult<&'static Regex> {
    static RULE: OnceLock<Regex> = OnceLock::new();

    if let Some(rule) = RULE.get() {
        return Ok(rule);
    }

    let compiled: Regex = Regex::new(MAC_PATTERN)
        .map_err(|e: regex::Error| CoreError::Other(CompactString::new(e.to_string())))?;

    Ok(RULE.get_or_init(|| compiled))
}

// ------------------------------------------------------------
// MAC address
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Six hex octets separated by `:` or `-`.
    pub fn parse(input: &str) -> CoreResult<Self> {
        if !mac_rule()?.is_match(input) {
            return Err(CoreError::InvalidMacAddress(CompactString::new(input)));
        }

        let mut octets: [u8; 6] = [0; 6];
        for (slot, hex) in octets.iter_mut().zip(input.split([':', '-'])) {
            *slot = u8::from_str_radix(hex, 16)
                .map_err(|_e| CoreError::InvalidMacAddress(CompactString::new(input)))?;
        }

        Ok(Self(octets))
    }

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    #[must_use]
    pub fn magic_packet(&self) -> [u8; PACKET_LEN] {
        let mut packet: [u8; PACKET_LEN] = [0xFF; PACKET_LEN];

        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }

        packet
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validate `mac` and build its magic packet.
pub fn build_packet(mac: &str) -> CoreResult<[u8; PACKET_LEN]> {
    Ok(MacAddress::parse(mac)?.magic_packet())
}

// ------------------------------------------------------------
// Broadcast discovery
// ------------------------------------------------------------

/// First IPv4 broadcast address of a non-loopback interface.
#[must_use]
pub fn pick_broadcast(interfaces: &[Interface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface: &&Interface| !iface.is_loopback())
        .find_map(|iface: &Interface| match &iface.addr {
            IfAddr::V4(v4) => v4.broadcast,
            IfAddr::V6(_) => None,
        })
}

pub fn discover_broadcast() -> CoreResult<Ipv4Addr> {
    let interfaces: Vec<Interface> = get_if_addrs::get_if_addrs()
        .map_err(|e: std::io::Error| CoreError::network("interfaces", e))?;

    debug!(
        marker = "WAKE_ON_LAN",
        operation_type = "discover_broadcast",
        interfaces = interfaces.len(),
        "Scanning interfaces for a broadcast address"
    );

    pick_broadcast(&interfaces).ok_or(CoreError::NoBroadcastAddress)
}

// ------------------------------------------------------------
// Sender
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WakeReport {
    pub mac: String,
    pub target: SocketAddrV4,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct WakeSender {
    default_port: u16,
    broadcast: Option<Ipv4Addr>,
}

impl Default for WakeSender {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            broadcast: None,
        }
    }
}

impl WakeSender {
    #[must_use]
    pub fn from_config(config: &WakeConfig) -> Self {
        Self {
            default_port: config.default_port,
            broadcast: config.broadcast_address,
        }
    }

    /// Port 0 means the configured default.
    #[must_use]
    pub fn effective_port(&self, port: u16) -> u16 {
        match (port, self.default_port) {
            (0, 0) => DEFAULT_PORT,
            (0, default) => default,
            (explicit, _) => explicit,
        }
    }

    /// Send one magic packet. No retry and no delivery confirmation.
    ///
    /// An explicit `broadcast` (or a configured one) skips interface discovery.
    #[instrument(level = "debug", skip(self))]
    pub async fn send(
        &self,
        mac: &str,
        port: u16,
        broadcast: Option<Ipv4Addr>,
    ) -> CoreResult<WakeReport> {
        let mac: MacAddress = MacAddress::parse(mac)?;
        let packet: [u8; PACKET_LEN] = mac.magic_packet();
        let port: u16 = self.effective_port(port);

        let address: Ipv4Addr = match broadcast.or(self.broadcast) {
            Some(address) => address,
            None => tokio::task::spawn_blocking(discover_broadcast).await??,
        };

        let target = SocketAddrV4::new(address, port);
        let label: String = target.to_string();

        let socket: UdpSocket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e: std::io::Error| CoreError::network(&label, e))?;

        socket
            .set_broadcast(true)
            .map_err(|e: std::io::Error| CoreError::network(&label, e))?;

        let sent: usize = socket
            .send_to(&packet, target)
            .await
            .map_err(|e: std::io::Error| CoreError::network(&label, e))?;

        drop(socket);

        info!(
            marker = "WAKE_ON_LAN",
            operation_type = "send",
            mac = %mac,
            target = %target,
            bytes = sent,
            "Magic packet sent"
        );

        Ok(WakeReport {
            mac: mac.to_string(),
            target,
            bytes: sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use get_if_addrs::Ifv4Addr;

    #[test]
    fn test_packet_is_bit_exact() {
        let packet = build_packet("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        for rep in packet[6..].chunks(6) {
            assert_eq!(rep, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        }
    }

    #[test]
    fn test_mac_validation() {
        assert_eq!(
            MacAddress::parse("01-23-45-67-89-ab").unwrap().octets(),
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]
        );
        for bad in ["AA:BB:CC", "AA:BB:CC:DD:EE:GG", "AABBCCDDEEFF", "AA:BB:CC:DD:EE:FF:00", ""] {
            assert!(matches!(
                MacAddress::parse(bad),
                Err(CoreError::InvalidMacAddress(_))
            ));
        }
    }

    fn iface(name: &str, ip: [u8; 4], broadcast: Option<[u8; 4]>) -> Interface {
        Interface {
            name: name.to_owned(),
            addr: IfAddr::V4(Ifv4Addr {
                ip: Ipv4Addr::from(ip),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                broadcast: broadcast.map(Ipv4Addr::from),
            }),
        }
    }

    #[test]
    fn test_pick_broadcast_skips_loopback() {
        let interfaces = vec![
            iface("lo", [127, 0, 0, 1], Some([127, 255, 255, 255])),
            iface("tun0", [10, 8, 0, 2], None),
            iface("eth0", [192, 168, 1, 20], Some([192, 168, 1, 255])),
            iface("eth1", [172, 16, 0, 3], Some([172, 16, 0, 255])),
        ];
        assert_eq!(
            pick_broadcast(&interfaces),
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
        assert_eq!(pick_broadcast(&interfaces[..2]), None);
    }

    #[test]
    fn test_port_zero_means_default() {
        let sender = WakeSender::default();
        assert_eq!(sender.effective_port(0), 9);
        assert_eq!(sender.effective_port(7), 7);
    }

    #[tokio::test]
    async fn test_send_to_explicit_address() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let report = WakeSender::default()
            .send("aa:bb:cc:dd:ee:ff", port, Some(Ipv4Addr::LOCALHOST))
            .await
            .unwrap();
        assert_eq!(report.bytes, 102);
        assert_eq!(report.mac, "AA:BB:CC:DD:EE:FF");

        let mut buf = [0u8; 256];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &build_packet("AA:BB:CC:DD:EE:FF").unwrap()[..]);
    }

    #[tokio::test]
    async fn test_invalid_mac_sends_nothing() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let err = WakeSender::default()
            .send("AA:BB:CC", port, Some(Ipv4Addr::LOCALHOST))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidMacAddress(_)));

        let mut buf = [0u8; 256];
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            receiver.recv_from(&mut buf),
        )
        .await;
        assert!(waited.is_err());
    }
}

use tracing::{info, warn};

use crate::error::{IfResetError, TransmitError};
use crate::net::arp;
use crate::net::channel::Transmit;
use crate::net::interface::NetworkInterface;

/// What happened to one interface during an announce run.
#[derive(Debug)]
pub enum AnnounceOutcome {
    /// Frames put on the wire: 2, or 1 when no broadcast address is known.
    Sent { frames: usize },
    Failed(IfResetError),
}

#[derive(Debug)]
pub struct AnnounceResult {
    pub interface_name: String,
    pub outcome: AnnounceOutcome,
}

impl AnnounceResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AnnounceOutcome::Sent { .. })
    }
}

/// Send a gratuitous ARP request and a broadcast ARP reply on each interface.
///
/// A failure on one interface is reported in its result and the loop moves
/// on. Interfaces missing a MAC or IPv4 address are reported as failed
/// rather than announced with made-up values.
pub fn announce(
    interfaces: &[NetworkInterface],
    tx: &mut impl Transmit,
    log: impl Fn(&str),
) -> Vec<AnnounceResult> {
    let results: Vec<AnnounceResult> = interfaces
        .iter()
        .map(|iface| {
            let outcome = match announce_one(iface, tx, &log) {
                Ok(frames) => {
                    log(&format!("[*] Announced {} on {} ({frames} frame(s))", describe(iface), iface.name));
                    AnnounceOutcome::Sent { frames }
                }
                Err(e) => {
                    warn!(interface = %iface.name, error = %e, "announce failed");
                    log(&format!("[!] Failed to announce on {}: {e}", iface.name));
                    AnnounceOutcome::Failed(e)
                }
            };
            AnnounceResult {
                interface_name: iface.name.clone(),
                outcome,
            }
        })
        .collect();

    let ok = results.iter().filter(|r| r.is_success()).count();
    info!(ok, failed = results.len() - ok, "announce finished");
    results
}

fn announce_one(
    iface: &NetworkInterface,
    tx: &mut impl Transmit,
    log: &impl Fn(&str),
) -> Result<usize, IfResetError> {
    let (mac, ip) = match (iface.mac_address, iface.ipv4_address) {
        (Some(mac), Some(ip)) => (mac, ip),
        _ => return Err(TransmitError::MissingAddress(iface.name.clone()).into()),
    };

    tx.send_frame(&iface.name, &arp::garp_request_frame(mac, ip))?;

    match iface.broadcast_address {
        Some(broadcast) => {
            tx.send_frame(&iface.name, &arp::garp_broadcast_frame(mac, ip, broadcast))?;
            Ok(2)
        }
        None => {
            log(&format!("[!] {} has no broadcast address; skipped broadcast reply", iface.name));
            Ok(1)
        }
    }
}

fn describe(iface: &NetworkInterface) -> String {
    match (iface.ipv4_address, iface.mac_address) {
        (Some(ip), Some(mac)) => format!("{ip} at {mac}"),
        _ => String::from("?"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::net::Ipv4Addr;

    use pnet::datalink::MacAddr;
    use pnet::packet::arp::ArpOperations;

    use super::*;
    use crate::net::arp::decode_frame;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(String, Vec<u8>)>,
        fail_on: Vec<String>,
    }

    impl Transmit for Recorder {
        fn send_frame(&mut self, interface: &str, frame: &[u8]) -> Result<(), TransmitError> {
            if self.fail_on.iter().any(|f| f == interface) {
                return Err(TransmitError::PermissionDenied);
            }
            self.sent.push((interface.to_string(), frame.to_vec()));
            Ok(())
        }
    }

    fn iface(name: &str, last: u8, broadcast: bool) -> NetworkInterface {
        NetworkInterface {
            name: name.into(),
            mac_address: Some(MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, last)),
            ipv4_address: Some(Ipv4Addr::new(192, 168, 1, last)),
            broadcast_address: broadcast.then(|| Ipv4Addr::new(192, 168, 1, 255)),
            is_up: true,
        }
    }

    #[test]
    fn sends_request_then_broadcast_reply() {
        let mut tx = Recorder::default();
        let results = announce(&[iface("eth0", 10, true)], &mut tx, |_| {});

        assert!(matches!(results[0].outcome, AnnounceOutcome::Sent { frames: 2 }));
        assert_eq!(tx.sent.len(), 2);

        let request = decode_frame(&tx.sent[0].1).unwrap();
        assert_eq!(request.operation, ArpOperations::Request);
        assert_eq!(request.target_ip.octets(), [0xc0, 0xa8, 0x01, 0x0a]);

        let reply = decode_frame(&tx.sent[1].1).unwrap();
        assert_eq!(reply.operation, ArpOperations::Reply);
        assert_eq!(reply.target_ip.octets(), [0xc0, 0xa8, 0x01, 0xff]);
    }

    #[test]
    fn failure_on_one_interface_does_not_stop_the_next() {
        let mut tx = Recorder {
            fail_on: vec!["eth0".into()],
            ..Default::default()
        };
        let lines = RefCell::new(Vec::new());
        let results = announce(
            &[iface("eth0", 10, true), iface("eth1", 11, true)],
            &mut tx,
            |line| lines.borrow_mut().push(line.to_string()),
        );

        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0].outcome,
            AnnounceOutcome::Failed(IfResetError::Transmit(TransmitError::PermissionDenied))
        ));
        assert!(results[1].is_success());
        assert!(tx.sent.iter().all(|(name, _)| name == "eth1"));
        assert_eq!(lines.borrow().len(), 2);
        assert!(lines.borrow()[0].starts_with("[!] Failed to announce on eth0"));
    }

    #[test]
    fn missing_broadcast_sends_request_only() {
        let mut tx = Recorder::default();
        let results = announce(&[iface("eth0", 10, false)], &mut tx, |_| {});

        assert!(matches!(results[0].outcome, AnnounceOutcome::Sent { frames: 1 }));
        assert_eq!(tx.sent.len(), 1);
        assert_eq!(decode_frame(&tx.sent[0].1).unwrap().operation, ArpOperations::Request);
    }

    #[test]
    fn no_defaults_for_missing_addresses() {
        let mut tx = Recorder::default();
        let mut bare = iface("eth0", 10, true);
        bare.mac_address = None;

        let results = announce(&[bare], &mut tx, |_| {});
        assert!(!results[0].is_success());
        assert!(tx.sent.is_empty());
    }
}

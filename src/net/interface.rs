use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use pnet::datalink::{self, MacAddr};
use pnet::ipnetwork::IpNetwork;
use tracing::debug;

use crate::config::ExclusionPolicy;
use crate::error::EnumerationError;
use crate::net::arp;

/// Address family tag carried by an enumeration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4, `AF_INET` (2).
    Inet,
    Inet6,
    /// Link-layer hardware address.
    Link,
}

/// One address reported for an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub family: AddressFamily,
    pub address: String,
    pub broadcast: Option<String>,
}

/// Raw per-interface record as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub name: String,
    pub addresses: Vec<AddressEntry>,
    pub is_up: bool,
}

/// A host interface with its addresses merged into one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub mac_address: Option<MacAddr>,
    pub ipv4_address: Option<Ipv4Addr>,
    pub broadcast_address: Option<Ipv4Addr>,
    pub is_up: bool,
}

/// Why an interface is or is not a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Excluded(String),
    NoMac,
    NoIpv4,
    Down,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Eligible => write!(f, "eligible"),
            Verdict::Excluded(prefix) => write!(f, "excluded ({prefix}*)"),
            Verdict::NoMac => write!(f, "no MAC"),
            Verdict::NoIpv4 => write!(f, "no IPv4"),
            Verdict::Down => write!(f, "down"),
        }
    }
}

/// Source of the host interface list.
pub trait InterfaceSource {
    fn entries(&self) -> Result<Vec<InterfaceEntry>, EnumerationError>;
}

/// Interfaces as reported by `getifaddrs` through pnet.
#[derive(Debug, Default)]
pub struct HostInterfaces;

impl InterfaceSource for HostInterfaces {
    fn entries(&self) -> Result<Vec<InterfaceEntry>, EnumerationError> {
        Ok(datalink::interfaces().iter().map(entry_from_link).collect())
    }
}

fn entry_from_link(iface: &datalink::NetworkInterface) -> InterfaceEntry {
    let mut addresses: Vec<AddressEntry> = iface
        .ips
        .iter()
        .map(|net| match net {
            IpNetwork::V4(v4) => AddressEntry {
                family: AddressFamily::Inet,
                address: v4.ip().to_string(),
                broadcast: subnet_broadcast(v4).map(|b| b.to_string()),
            },
            IpNetwork::V6(v6) => AddressEntry {
                family: AddressFamily::Inet6,
                address: v6.ip().to_string(),
                broadcast: None,
            },
        })
        .collect();

    if let Some(mac) = iface.mac.filter(|m| *m != MacAddr(0, 0, 0, 0, 0, 0)) {
        addresses.push(AddressEntry {
            family: AddressFamily::Link,
            address: mac.to_string(),
            broadcast: None,
        });
    }

    // Administratively up and carrying traffic.
    InterfaceEntry {
        name: iface.name.clone(),
        addresses,
        is_up: iface.is_up() && iface.is_running(),
    }
}

/// /31 and /32 networks have no broadcast address.
fn subnet_broadcast(net: &Ipv4Network) -> Option<Ipv4Addr> {
    (net.prefix() < 31).then(|| net.broadcast())
}

/// Merge entries into one record per interface name, sorted by name.
///
/// The first IPv4 entry supplies address and broadcast; a link-layer entry
/// supplies the MAC. Entries whose text does not parse are skipped.
pub fn merge(entries: Vec<InterfaceEntry>) -> Vec<NetworkInterface> {
    let mut merged: BTreeMap<String, NetworkInterface> = BTreeMap::new();

    for entry in entries {
        let record = merged
            .entry(entry.name.clone())
            .or_insert_with(|| NetworkInterface {
                name: entry.name.clone(),
                mac_address: None,
                ipv4_address: None,
                broadcast_address: None,
                is_up: false,
            });
        record.is_up |= entry.is_up;

        for addr in entry.addresses {
            match addr.family {
                AddressFamily::Inet if record.ipv4_address.is_none() => {
                    match arp::parse_ipv4(&addr.address) {
                        Ok(ip) => {
                            record.ipv4_address = Some(ip);
                            record.broadcast_address =
                                addr.broadcast.as_deref().and_then(|b| arp::parse_ipv4(b).ok());
                        }
                        Err(e) => debug!(interface = %record.name, error = %e, "skipping IPv4 entry"),
                    }
                }
                AddressFamily::Link if record.mac_address.is_none() => {
                    match arp::parse_mac(&addr.address) {
                        Ok(mac) => record.mac_address = Some(mac),
                        Err(e) => debug!(interface = %record.name, error = %e, "skipping link entry"),
                    }
                }
                _ => {}
            }
        }
    }

    merged.into_values().collect()
}

/// Decide whether `iface` is an announce target under `policy`.
pub fn verdict(iface: &NetworkInterface, policy: &ExclusionPolicy) -> Verdict {
    if let Some(prefix) = policy.excluding(&iface.name) {
        return Verdict::Excluded(prefix.to_string());
    }
    if iface.mac_address.is_none() {
        return Verdict::NoMac;
    }
    if iface.ipv4_address.is_none() {
        return Verdict::NoIpv4;
    }
    if !iface.is_up {
        return Verdict::Down;
    }
    Verdict::Eligible
}

/// Keep only eligible interfaces. Pure: no I/O.
pub fn classify(entries: Vec<InterfaceEntry>, policy: &ExclusionPolicy) -> Vec<NetworkInterface> {
    merge(entries)
        .into_iter()
        .filter(|iface| verdict(iface, policy) == Verdict::Eligible)
        .collect()
}

/// Pull entries from `source`. A host always has at least loopback, so an
/// empty list means enumeration itself failed.
fn enumerate(source: &impl InterfaceSource) -> Result<Vec<InterfaceEntry>, EnumerationError> {
    let entries = source.entries()?;
    if entries.is_empty() {
        return Err(EnumerationError::Source("no interfaces reported by the host".into()));
    }
    Ok(entries)
}

/// Enumerate the host and return announce targets.
pub fn list_eligible_interfaces(
    source: &impl InterfaceSource,
    policy: &ExclusionPolicy,
) -> Result<Vec<NetworkInterface>, EnumerationError> {
    Ok(classify(enumerate(source)?, policy))
}

/// Enumerate the host and return every interface with its verdict.
pub fn list_interfaces(
    source: &impl InterfaceSource,
    policy: &ExclusionPolicy,
) -> Result<Vec<(NetworkInterface, Verdict)>, EnumerationError> {
    Ok(merge(enumerate(source)?)
        .into_iter()
        .map(|iface| {
            let v = verdict(&iface, policy);
            (iface, v)
        })
        .collect())
}

/// Narrow `listed` to the eligible interfaces named in `requested`, or to all
/// eligible ones when nothing was requested.
///
/// Requested names that will not be announced come back alongside, with
/// their verdict or `None` if the host has no such interface.
pub fn select_targets(
    listed: Vec<(NetworkInterface, Verdict)>,
    requested: &[String],
) -> (Vec<NetworkInterface>, Vec<(String, Option<Verdict>)>) {
    let mut rejected = Vec::new();
    for name in requested {
        match listed.iter().find(|(iface, _)| iface.name == *name) {
            None => rejected.push((name.clone(), None)),
            Some((_, v)) if *v != Verdict::Eligible => rejected.push((name.clone(), Some(v.clone()))),
            Some(_) => {}
        }
    }

    let targets = listed
        .into_iter()
        .filter(|(iface, v)| {
            *v == Verdict::Eligible && (requested.is_empty() || requested.contains(&iface.name))
        })
        .map(|(iface, _)| iface)
        .collect();
    (targets, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<InterfaceEntry>);

    impl InterfaceSource for FixedSource {
        fn entries(&self) -> Result<Vec<InterfaceEntry>, EnumerationError> {
            Ok(self.0.clone())
        }
    }

    fn inet(ip: &str, broadcast: Option<&str>) -> AddressEntry {
        AddressEntry {
            family: AddressFamily::Inet,
            address: ip.into(),
            broadcast: broadcast.map(Into::into),
        }
    }

    fn link(mac: &str) -> AddressEntry {
        AddressEntry {
            family: AddressFamily::Link,
            address: mac.into(),
            broadcast: None,
        }
    }

    fn entry(name: &str, is_up: bool, addresses: Vec<AddressEntry>) -> InterfaceEntry {
        InterfaceEntry {
            name: name.into(),
            addresses,
            is_up,
        }
    }

    fn full(name: &str, is_up: bool) -> InterfaceEntry {
        entry(
            name,
            is_up,
            vec![inet("192.168.1.10", Some("192.168.1.255")), link("aa:bb:cc:dd:ee:ff")],
        )
    }

    fn names(ifaces: &[NetworkInterface]) -> Vec<&str> {
        ifaces.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn veth_is_filtered_out() {
        let eligible = classify(
            vec![full("eth0", true), full("veth1234", true)],
            &ExclusionPolicy::announce_default(),
        );
        assert_eq!(names(&eligible), ["eth0"]);

        let eth0 = &eligible[0];
        assert_eq!(eth0.mac_address, Some(MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)));
        assert_eq!(eth0.ipv4_address, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(eth0.broadcast_address, Some(Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn down_interface_is_filtered_out() {
        let eligible = classify(
            vec![full("eth0", false), full("eth1", true)],
            &ExclusionPolicy::announce_default(),
        );
        assert_eq!(names(&eligible), ["eth1"]);
    }

    #[test]
    fn missing_ipv4_or_mac_is_skipped() {
        let eligible = classify(
            vec![
                entry("eth0", true, vec![link("aa:bb:cc:dd:ee:01")]),
                entry("eth1", true, vec![inet("10.0.0.2", Some("10.0.0.255"))]),
                entry("eth2", true, vec![inet("10.0.1.2", None), link("aa:bb:cc:dd:ee:03")]),
            ],
            &ExclusionPolicy::announce_default(),
        );
        assert_eq!(names(&eligible), ["eth2"]);
        assert_eq!(eligible[0].broadcast_address, None);
    }

    #[test]
    fn split_entries_merge_by_name() {
        let merged = merge(vec![
            entry("wlan0", true, vec![link("02:00:00:00:00:01")]),
            entry("wlan0", true, vec![inet("10.1.2.3", Some("10.1.2.255")), inet("10.9.9.9", None)]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].ipv4_address, Some(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(merged[0].broadcast_address, Some(Ipv4Addr::new(10, 1, 2, 255)));
        assert!(merged[0].mac_address.is_some());
    }

    #[test]
    fn ipv6_only_and_garbage_entries_are_ignored() {
        let eligible = classify(
            vec![entry(
                "eth0",
                true,
                vec![
                    AddressEntry {
                        family: AddressFamily::Inet6,
                        address: "fe80::1".into(),
                        broadcast: None,
                    },
                    inet("not-an-ip", None),
                    link("aa:bb:cc:dd:ee:ff"),
                ],
            )],
            &ExclusionPolicy::announce_default(),
        );
        assert!(eligible.is_empty());
    }

    #[test]
    fn verdicts_explain_exclusion() {
        let source = FixedSource(vec![
            full("eth0", true),
            full("docker0", true),
            full("eth1", false),
            entry("lo", true, vec![inet("127.0.0.1", None)]),
        ]);
        let listed = list_interfaces(&source, &ExclusionPolicy::announce_default()).unwrap();
        let verdicts: Vec<(&str, &Verdict)> = listed.iter().map(|(i, v)| (i.name.as_str(), v)).collect();
        assert_eq!(
            verdicts,
            [
                ("docker0", &Verdict::Excluded("docker".into())),
                ("eth0", &Verdict::Eligible),
                ("eth1", &Verdict::Down),
                ("lo", &Verdict::Excluded("lo".into())),
            ]
        );
    }

    #[test]
    fn list_eligible_uses_policy() {
        let source = FixedSource(vec![full("eth0", true), full("wlan0", true)]);
        let policy = ExclusionPolicy::from_prefixes(["wl"]);
        let eligible = list_eligible_interfaces(&source, &policy).unwrap();
        assert_eq!(names(&eligible), ["eth0"]);
    }

    fn host_link(flags: u32) -> datalink::NetworkInterface {
        datalink::NetworkInterface {
            name: "eth0".into(),
            description: String::new(),
            index: 2,
            mac: Some(MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)),
            ips: vec!["192.168.1.10/24".parse().unwrap()],
            flags,
        }
    }

    #[test]
    fn admin_up_without_carrier_is_down() {
        let up = libc::IFF_UP as u32;
        let running = libc::IFF_RUNNING as u32;
        let policy = ExclusionPolicy::announce_default();

        let no_carrier = entry_from_link(&host_link(up));
        assert!(!no_carrier.is_up);
        assert!(classify(vec![no_carrier], &policy).is_empty());

        let live = entry_from_link(&host_link(up | running));
        assert_eq!(names(&classify(vec![live], &policy)), ["eth0"]);
    }

    #[test]
    fn empty_enumeration_is_an_error() {
        let policy = ExclusionPolicy::announce_default();
        assert!(matches!(
            list_eligible_interfaces(&FixedSource(Vec::new()), &policy),
            Err(EnumerationError::Source(_))
        ));
        assert!(list_interfaces(&FixedSource(Vec::new()), &policy).is_err());
    }

    #[test]
    fn requested_names_report_why_they_are_skipped() {
        let source = FixedSource(vec![full("eth0", true), full("eth1", false), full("docker0", true)]);
        let listed = list_interfaces(&source, &ExclusionPolicy::announce_default()).unwrap();
        let requested: Vec<String> = ["eth0", "eth1", "docker0", "eth9"].map(String::from).to_vec();

        let (targets, rejected) = select_targets(listed, &requested);
        assert_eq!(names(&targets), ["eth0"]);
        assert_eq!(
            rejected,
            [
                ("eth1".to_string(), Some(Verdict::Down)),
                ("docker0".to_string(), Some(Verdict::Excluded("docker".into()))),
                ("eth9".to_string(), None),
            ]
        );
    }

    #[test]
    fn no_request_selects_every_eligible_interface() {
        let source = FixedSource(vec![full("eth0", true), full("eth1", true), full("veth0", true)]);
        let listed = list_interfaces(&source, &ExclusionPolicy::announce_default()).unwrap();
        let (targets, rejected) = select_targets(listed, &[]);
        assert_eq!(names(&targets), ["eth0", "eth1"]);
        assert!(rejected.is_empty());
    }

    #[test]
    fn point_to_point_has_no_broadcast() {
        let net: Ipv4Network = "10.0.0.1/32".parse().unwrap();
        assert_eq!(subnet_broadcast(&net), None);
        let net: Ipv4Network = "192.168.1.10/24".parse().unwrap();
        assert_eq!(subnet_broadcast(&net), Some(Ipv4Addr::new(192, 168, 1, 255)));
    }
}

//! Address management over a NETLINK_ROUTE socket.
//!
//! Only the three requests the flush action needs are implemented: a link
//! dump, an IPv4 address dump, and address deletion.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::mem;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::error::FlushError;

const NETLINK_ROUTE: i32 = 0;

const RTM_NEWLINK: u16 = 16;
const RTM_GETLINK: u16 = 18;
const RTM_NEWADDR: u16 = 20;
const RTM_DELADDR: u16 = 21;
const RTM_GETADDR: u16 = 22;

const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;
const NLM_F_DUMP: u16 = 0x0100 | 0x0200;

const NLMSG_NOOP: u16 = 1;
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;

const AF_UNSPEC: u8 = 0;
const AF_INET: u8 = 2;

const IFLA_IFNAME: u16 = 3;
const IFLA_OPERSTATE: u16 = 16;

const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;
const IFA_LABEL: u16 = 3;

const NLMSG_HDR_LEN: usize = 16;
const IFINFOMSG_LEN: usize = 16;
const IFADDRMSG_LEN: usize = 8;
const RTA_HDR_LEN: usize = 4;
const ALIGN: usize = 4;

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// A link as reported by an RTM_GETLINK dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub index: u32,
    pub name: String,
    pub operstate: u8,
}

impl Link {
    pub fn oper_state(&self) -> &'static str {
        match self.operstate {
            1 => "NOTPRESENT",
            2 => "DOWN",
            3 => "TESTING",
            4 => "DORMANT",
            5 => "LOWERLAYERDOWN",
            6 => "UP",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} state {}", self.index, self.name, self.oper_state())
    }
}

/// An IPv4 address as reported by an RTM_GETADDR dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub index: u32,
    pub prefix_len: u8,
    pub scope: u8,
    pub address: Option<Ipv4Addr>,
    pub local: Option<Ipv4Addr>,
    pub label: Option<String>,
}

/// Interface enumeration and address removal.
pub trait AddressManager {
    fn links(&mut self) -> Result<Vec<Link>, FlushError>;

    /// Remove every address labelled `label`, returning how many went away.
    fn flush_addresses(&mut self, label: &str) -> Result<usize, FlushError>;
}

/// An open NETLINK_ROUTE socket. Closed on drop.
pub struct NetlinkHandle {
    fd: i32,
    seq: u32,
    pid: u32,
}

impl NetlinkHandle {
    pub fn open() -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the fd is owned by the returned handle.
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, NETLINK_ROUTE) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut handle = Self { fd, seq: 1, pid: 0 };

        // SAFETY: sockaddr_nl is plain data; zeroed is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        let mut addrlen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;

        // SAFETY: addr outlives both calls and addrlen matches its size.
        let ret = unsafe {
            libc::bind(fd, &addr as *const libc::sockaddr_nl as *const libc::sockaddr, addrlen)
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the kernel writes at most addrlen bytes into addr.
        let ret = unsafe {
            libc::getsockname(fd, &mut addr as *mut libc::sockaddr_nl as *mut libc::sockaddr, &mut addrlen)
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        handle.pid = addr.nl_pid;
        debug!(pid = handle.pid, "netlink handle opened");
        Ok(handle)
    }

    /// Dump all links.
    pub fn list_links(&mut self) -> Result<Vec<Link>, FlushError> {
        let seq = self.next_seq();
        let msg = link_dump_request(seq, self.pid);
        let responses = self.request(&msg, seq)?;
        Ok(responses.iter().filter_map(|m| parse_link(m)).collect())
    }

    /// Dump all IPv4 addresses.
    pub fn list_addresses(&mut self) -> Result<Vec<Address>, FlushError> {
        let seq = self.next_seq();
        let msg = addr_dump_request(seq, self.pid);
        let responses = self.request(&msg, seq)?;
        Ok(responses.iter().filter_map(|m| parse_address(m)).collect())
    }

    pub fn delete_address(&mut self, addr: &Address) -> Result<(), FlushError> {
        let seq = self.next_seq();
        let msg = del_addr_request(seq, self.pid, addr);
        self.request(&msg, seq)?;
        Ok(())
    }

    /// Send one request and collect the replies until DONE or the ACK.
    fn request(&mut self, msg: &[u8], seq: u32) -> Result<Vec<Vec<u8>>, FlushError> {
        // SAFETY: msg is a valid buffer of msg.len() bytes.
        let sent = unsafe { libc::send(self.fd, msg.as_ptr() as *const libc::c_void, msg.len(), 0) };
        if sent < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let mut responses = Vec::new();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            // SAFETY: buf is a valid writable buffer of buf.len() bytes.
            let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            if n == 0 {
                break;
            }

            match split_messages(&buf[..n as usize], seq, &mut responses)? {
                Batch::Done => break,
                Batch::More => continue,
            }
        }

        trace!(seq, count = responses.len(), "netlink request complete");
        Ok(responses)
    }

    fn next_seq(&mut self) -> u32 {
        let s = self.seq;
        self.seq = self.seq.wrapping_add(1);
        s
    }
}

impl AddressManager for NetlinkHandle {
    fn links(&mut self) -> Result<Vec<Link>, FlushError> {
        self.list_links()
    }

    fn flush_addresses(&mut self, label: &str) -> Result<usize, FlushError> {
        let targets = labelled(self.list_addresses()?, label);

        let mut removed = 0;
        for addr in &targets {
            if deleted(self.delete_address(addr))? {
                removed += 1;
            } else {
                debug!(label, address = ?addr.local, "address already gone");
            }
        }
        Ok(removed)
    }
}

impl Drop for NetlinkHandle {
    fn drop(&mut self) {
        // SAFETY: fd was opened by us and is closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
        debug!(pid = self.pid, "netlink handle closed");
    }
}

/// Addresses whose IFA_LABEL is exactly `label`.
fn labelled(addresses: Vec<Address>, label: &str) -> Vec<Address> {
    addresses
        .into_iter()
        .filter(|a| a.label.as_deref() == Some(label))
        .collect()
}

/// Outcome of one RTM_DELADDR: `true` if removed, `false` if it was
/// already gone. Deleting a primary also drops its secondaries.
fn deleted(result: Result<(), FlushError>) -> Result<bool, FlushError> {
    match result {
        Ok(()) => Ok(true),
        Err(FlushError::Kernel { errno, .. }) if errno == libc::EADDRNOTAVAIL => Ok(false),
        Err(e) => Err(e),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Batch {
    Done,
    More,
}

/// Split one datagram into messages, appending payload messages for `seq`.
fn split_messages(buf: &[u8], seq: u32, out: &mut Vec<Vec<u8>>) -> Result<Batch, FlushError> {
    let mut offset = 0;
    while offset + NLMSG_HDR_LEN <= buf.len() {
        let len = read_u32(buf, offset) as usize;
        let kind = read_u16(buf, offset + 4);
        let msg_seq = read_u32(buf, offset + 8);

        if len < NLMSG_HDR_LEN || offset + len > buf.len() {
            break;
        }

        if msg_seq == seq {
            match kind {
                NLMSG_DONE => return Ok(Batch::Done),
                NLMSG_ERROR => {
                    if len >= NLMSG_HDR_LEN + 4 {
                        let errno = read_i32(buf, offset + NLMSG_HDR_LEN);
                        if errno < 0 {
                            return Err(FlushError::from_errno(-errno));
                        }
                    }
                    return Ok(Batch::Done);
                }
                NLMSG_NOOP => {}
                _ => out.push(buf[offset..offset + len].to_vec()),
            }
        }

        offset += align(len);
    }
    Ok(Batch::More)
}

fn link_dump_request(seq: u32, pid: u32) -> Vec<u8> {
    let mut msg = header(RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP, seq, pid, IFINFOMSG_LEN);
    msg[NLMSG_HDR_LEN] = AF_UNSPEC;
    msg
}

fn addr_dump_request(seq: u32, pid: u32) -> Vec<u8> {
    let mut msg = header(RTM_GETADDR, NLM_F_REQUEST | NLM_F_DUMP, seq, pid, IFADDRMSG_LEN);
    msg[NLMSG_HDR_LEN] = AF_INET;
    msg
}

fn del_addr_request(seq: u32, pid: u32, addr: &Address) -> Vec<u8> {
    let mut msg = header(RTM_DELADDR, NLM_F_REQUEST | NLM_F_ACK, seq, pid, IFADDRMSG_LEN);
    let ifa = NLMSG_HDR_LEN;
    msg[ifa] = AF_INET;
    msg[ifa + 1] = addr.prefix_len;
    msg[ifa + 3] = addr.scope;
    msg[ifa + 4..ifa + 8].copy_from_slice(&addr.index.to_ne_bytes());

    if let Some(local) = addr.local {
        push_attr(&mut msg, IFA_LOCAL, &local.octets());
    }
    if let Some(address) = addr.address {
        push_attr(&mut msg, IFA_ADDRESS, &address.octets());
    }
    let total = msg.len() as u32;
    msg[0..4].copy_from_slice(&total.to_ne_bytes());
    msg
}

fn header(kind: u16, flags: u16, seq: u32, pid: u32, body_len: usize) -> Vec<u8> {
    let len = NLMSG_HDR_LEN + body_len;
    let mut msg = vec![0u8; align(len)];
    msg[0..4].copy_from_slice(&(len as u32).to_ne_bytes());
    msg[4..6].copy_from_slice(&kind.to_ne_bytes());
    msg[6..8].copy_from_slice(&flags.to_ne_bytes());
    msg[8..12].copy_from_slice(&seq.to_ne_bytes());
    msg[12..16].copy_from_slice(&pid.to_ne_bytes());
    msg
}

fn push_attr(msg: &mut Vec<u8>, kind: u16, data: &[u8]) {
    let len = RTA_HDR_LEN + data.len();
    msg.extend_from_slice(&(len as u16).to_ne_bytes());
    msg.extend_from_slice(&kind.to_ne_bytes());
    msg.extend_from_slice(data);
    msg.resize(align(msg.len()), 0);
}

fn parse_link(msg: &[u8]) -> Option<Link> {
    if msg.len() < NLMSG_HDR_LEN + IFINFOMSG_LEN || read_u16(msg, 4) != RTM_NEWLINK {
        return None;
    }
    let body = &msg[NLMSG_HDR_LEN..];
    let attrs = parse_attrs(&body[IFINFOMSG_LEN..]);

    Some(Link {
        index: read_u32(body, 4),
        name: attrs.get(&IFLA_IFNAME).map(|d| c_string(d))?,
        operstate: attrs.get(&IFLA_OPERSTATE).and_then(|d| d.first().copied()).unwrap_or(0),
    })
}

fn parse_address(msg: &[u8]) -> Option<Address> {
    if msg.len() < NLMSG_HDR_LEN + IFADDRMSG_LEN || read_u16(msg, 4) != RTM_NEWADDR {
        return None;
    }
    let body = &msg[NLMSG_HDR_LEN..];
    if body[0] != AF_INET {
        return None;
    }
    let attrs = parse_attrs(&body[IFADDRMSG_LEN..]);

    Some(Address {
        prefix_len: body[1],
        scope: body[3],
        index: read_u32(body, 4),
        address: attrs.get(&IFA_ADDRESS).and_then(|d| ipv4(d)),
        local: attrs.get(&IFA_LOCAL).and_then(|d| ipv4(d)),
        label: attrs.get(&IFA_LABEL).map(|d| c_string(d)),
    })
}

fn parse_attrs(mut data: &[u8]) -> HashMap<u16, Vec<u8>> {
    let mut attrs = HashMap::new();
    while data.len() >= RTA_HDR_LEN {
        let len = read_u16(data, 0) as usize;
        let kind = read_u16(data, 2);
        if len < RTA_HDR_LEN || len > data.len() {
            break;
        }
        attrs.insert(kind, data[RTA_HDR_LEN..len].to_vec());
        data = &data[align(len).min(data.len())..];
    }
    attrs
}

fn ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    match data {
        [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => None,
    }
}

fn c_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
}

fn align(len: usize) -> usize {
    (len + ALIGN - 1) & !(ALIGN - 1)
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    read_u32(buf, at) as i32
}

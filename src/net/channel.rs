use std::io;

use pnet::datalink::{self, Config, DataLinkSender, NetworkInterface as LinkInterface};
use tracing::debug;

use crate::error::TransmitError;

/// Something that can put a raw Ethernet frame on a named interface.
pub trait Transmit {
    fn send_frame(&mut self, interface: &str, frame: &[u8]) -> Result<(), TransmitError>;
}

/// Sends frames through a link-layer raw socket, one socket per frame.
#[derive(Debug, Default)]
pub struct RawTransmitter;

impl Transmit for RawTransmitter {
    fn send_frame(&mut self, interface: &str, frame: &[u8]) -> Result<(), TransmitError> {
        send_frame(interface, frame)
    }
}

/// Owned transmit half of a pnet datalink channel.
///
/// The socket lives as long as the value; dropping it closes the socket.
struct Channel {
    interface: String,
    tx: Box<dyn DataLinkSender>,
}

impl Channel {
    /// Open an Ethernet channel bound to `iface`.
    fn open(iface: &LinkInterface) -> Result<Self, TransmitError> {
        match datalink::channel(iface, Config::default()) {
            Ok(datalink::Channel::Ethernet(tx, _rx)) => Ok(Self {
                interface: iface.name.clone(),
                tx,
            }),
            Ok(_) => Err(TransmitError::UnsupportedChannel(iface.name.clone())),
            Err(e) => Err(classify(&iface.name, e)),
        }
    }

    /// Write the whole frame in one send.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        self.tx
            .send_to(frame, None)
            .ok_or_else(|| TransmitError::Io {
                interface: self.interface.clone(),
                source: io::Error::new(io::ErrorKind::Other, "send returned no result"),
            })?
            .map_err(|e| classify(&self.interface, e))
    }
}

/// Send one raw frame on `interface`.
///
/// The interface must exist and be administratively up. The socket is
/// released before returning, whether or not the send succeeded.
pub fn send_frame(interface: &str, frame: &[u8]) -> Result<(), TransmitError> {
    let iface = resolve(interface)?;
    if !iface.is_up() {
        return Err(TransmitError::InterfaceDown(interface.to_string()));
    }

    let mut channel = Channel::open(&iface)?;
    let sent = channel.send(frame);
    drop(channel);

    debug!(interface, bytes = frame.len(), ok = sent.is_ok(), "raw frame send");
    sent
}

fn resolve(name: &str) -> Result<LinkInterface, TransmitError> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| TransmitError::InterfaceNotFound(name.into()))
}

fn classify(interface: &str, err: io::Error) -> TransmitError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => TransmitError::PermissionDenied,
        _ => match err.raw_os_error() {
            Some(libc::ENODEV) | Some(libc::ENXIO) => TransmitError::InterfaceNotFound(interface.into()),
            Some(libc::ENETDOWN) => TransmitError::InterfaceDown(interface.into()),
            _ => TransmitError::Io {
                interface: interface.into(),
                source: err,
            },
        },
    }
}

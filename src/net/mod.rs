pub mod arp;
pub mod channel;
pub mod interface;
pub mod netlink;

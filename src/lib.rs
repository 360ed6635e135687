//! Interface reset toolkit: announce hosts with gratuitous ARP and flush
//! interface addresses over rtnetlink.

pub mod config;
pub mod core;
pub mod error;
pub mod net;

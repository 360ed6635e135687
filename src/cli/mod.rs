pub mod args;

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use ifreset::config::ExclusionPolicy;
use ifreset::core::{announce, flush};
use ifreset::error::{EnumerationError, Result};
use ifreset::net::channel::RawTransmitter;
use ifreset::net::interface::{self, HostInterfaces};
use ifreset::net::netlink::NetlinkHandle;

use crate::cli::args::{Args, Command};

/// Some interface failed; the rest were still processed.
const EXIT_PARTIAL: u8 = 1;

pub fn run() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Interfaces { exclude } => {
            let policy = ExclusionPolicy::or_default(exclude, ExclusionPolicy::announce_default);
            let listed = interface::list_interfaces(&HostInterfaces, &policy)?;

            println!("{:<16} {:<18} {:<16} {:<16} {}", "NAME", "MAC", "IPv4", "BROADCAST", "STATUS");
            println!("{}", "\u{2500}".repeat(80));
            for (iface, verdict) in &listed {
                println!(
                    "{:<16} {:<18} {:<16} {:<16} {}",
                    iface.name,
                    opt(iface.mac_address),
                    opt(iface.ipv4_address),
                    opt(iface.broadcast_address),
                    verdict,
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Announce { exclude, interface } => {
            let policy = ExclusionPolicy::or_default(exclude, ExclusionPolicy::announce_default);
            let listed = interface::list_interfaces(&HostInterfaces, &policy)?;
            let (targets, rejected) = interface::select_targets(listed, &interface);
            for (name, verdict) in &rejected {
                match verdict {
                    Some(v) => println!("[!] Skipping {name}: {v}"),
                    None => println!("[!] Skipping {name}: no such interface"),
                }
            }

            if targets.is_empty() {
                println!("[*] No eligible interfaces.");
                return Ok(ExitCode::SUCCESS);
            }

            let results = announce::announce(&targets, &mut RawTransmitter, |msg| println!("{msg}"));
            Ok(exit_code(results.iter().all(|r| r.is_success())))
        }
        Command::Flush { exclude, dry_run } => {
            let policy = ExclusionPolicy::or_default(exclude, ExclusionPolicy::flush_default);
            let mut handle = NetlinkHandle::open().map_err(EnumerationError::from)?;

            if dry_run {
                for link in flush::links_to_flush(&mut handle, &policy)? {
                    println!("[*] Would flush addresses on {link}");
                }
                return Ok(ExitCode::SUCCESS);
            }

            let results = flush::flush_all_addresses(&mut handle, &policy, |msg| println!("{msg}"))?;
            Ok(exit_code(results.iter().all(|r| r.is_success())))
        }
    }
}

fn exit_code(all_ok: bool) -> ExitCode {
    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

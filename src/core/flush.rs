use tracing::{debug, info, warn};

use crate::config::ExclusionPolicy;
use crate::error::{EnumerationError, FlushError};
use crate::net::netlink::{AddressManager, Link};

#[derive(Debug)]
pub enum FlushOutcome {
    Flushed { removed: usize },
    Failed(FlushError),
}

/// Result of flushing one interface.
#[derive(Debug)]
pub struct FlushResult {
    pub interface_name: String,
    pub outcome: FlushOutcome,
}

impl FlushResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FlushOutcome::Flushed { .. })
    }
}

/// Enumerate links and keep the ones `policy` allows us to flush.
///
/// Failing to enumerate is fatal for the whole run.
pub fn links_to_flush(
    manager: &mut impl AddressManager,
    policy: &ExclusionPolicy,
) -> Result<Vec<Link>, EnumerationError> {
    Ok(select(manager.links()?, policy))
}

fn select(links: Vec<Link>, policy: &ExclusionPolicy) -> Vec<Link> {
    links
        .into_iter()
        .filter(|link| match policy.excluding(&link.name) {
            Some(prefix) => {
                debug!(name = %link.name, prefix, "excluded from flush");
                false
            }
            None => true,
        })
        .collect()
}

/// Remove every address from every non-excluded interface.
///
/// Every link is listed through `log` first, excluded ones included.
/// Best effort: a rejected flush is recorded in that interface's result
/// and the remaining interfaces are still processed.
pub fn flush_all_addresses(
    manager: &mut impl AddressManager,
    policy: &ExclusionPolicy,
    log: impl Fn(&str),
) -> Result<Vec<FlushResult>, EnumerationError> {
    let links = manager.links()?;
    for link in &links {
        log(&format!("[*] {link}"));
    }

    let results: Vec<FlushResult> = select(links, policy)
        .into_iter()
        .map(|link| {
            let outcome = match manager.flush_addresses(&link.name) {
                Ok(removed) => {
                    log(&format!("[*] Flushed addresses on {} ({removed} removed)", link.name));
                    FlushOutcome::Flushed { removed }
                }
                Err(e) => {
                    warn!(interface = %link.name, error = %e, "flush failed");
                    log(&format!("[!] Failed to flush {}: {e}", link.name));
                    FlushOutcome::Failed(e)
                }
            };
            FlushResult {
                interface_name: link.name,
                outcome,
            }
        })
        .collect();

    let ok = results.iter().filter(|r| r.is_success()).count();
    info!(ok, failed = results.len() - ok, "flush finished");
    Ok(results)
}

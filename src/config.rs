/// Name prefixes of virtual, loopback, tunnel and container interfaces
/// skipped by the announce action.
pub const ANNOUNCE_EXCLUDED_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "xfrm", "vme", "vsync",
];

/// Name prefixes skipped by the flush action. Unlike the announce set this
/// also protects the two management NICs and leaves `xfrm`/`vsync` alone.
pub const FLUSH_EXCLUDED_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vme", "enp10s0", "enp11s0",
];

/// Set of interface name prefixes an action must not touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPolicy {
    prefixes: Vec<String>,
}

impl ExclusionPolicy {
    pub fn from_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn announce_default() -> Self {
        Self::from_prefixes(ANNOUNCE_EXCLUDED_PREFIXES.iter().copied())
    }

    pub fn flush_default() -> Self {
        Self::from_prefixes(FLUSH_EXCLUDED_PREFIXES.iter().copied())
    }

    /// Policy from CLI overrides, falling back to `default` when none were given.
    pub fn or_default(overrides: Vec<String>, default: fn() -> Self) -> Self {
        if overrides.is_empty() {
            default()
        } else {
            Self::from_prefixes(overrides)
        }
    }

    /// The first prefix that excludes `name`, if any.
    pub fn excluding(&self, name: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| name.starts_with(prefix))
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluding(name).is_some()
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

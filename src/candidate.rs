//! Egress candidates and failover chains.
//!
//! A chain is an ordered, singly-linked sequence of [`Candidate`]s tried in
//! order until one succeeds. The `successor` link is exclusively owned, so a
//! chain can be decomposed and relinked without reference counting. The
//! special direct endpoint carries no address and is never equal to a proxy
//! endpoint; it has no [`HealthKey`] and therefore cannot be individually
//! disabled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Proxy protocol of a non-direct candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks4 => "socks4",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate connects: through a proxy hop, or straight out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Pass-through with no address; the terminal last resort of any chain.
    Direct,
    Proxy {
        scheme: ProxyScheme,
        host: String,
        port: u16,
    },
}

impl Endpoint {
    pub fn proxy(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Endpoint::Proxy {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Endpoint::Direct)
    }

    /// The identity under which failure history is tracked.
    ///
    /// Direct endpoints have none and are routed to the direct-failure
    /// counter instead of the registry.
    pub fn health_key(&self) -> Option<HealthKey> {
        match self {
            Endpoint::Direct => None,
            Endpoint::Proxy { scheme, host, port } => Some(HealthKey {
                scheme: *scheme,
                host: host.clone(),
                port: *port,
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Direct => f.write_str("direct"),
            Endpoint::Proxy { scheme, host, port } => {
                write!(f, "{}://{}:{}", scheme, host, port)
            }
        }
    }
}

/// Canonical identity of a proxy candidate: `(scheme, host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthKey {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HealthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// One hop in a failover chain, linked to its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub endpoint: Endpoint,
    pub successor: Option<Box<Candidate>>,
}

impl Candidate {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            successor: None,
        }
    }

    pub fn direct() -> Self {
        Self::new(Endpoint::Direct)
    }

    pub fn proxy(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self::new(Endpoint::proxy(scheme, host, port))
    }

    /// Append `next` as this candidate's successor, returning the head.
    /// Chains read in try-order: `a.then(b).then(c)` tries a, then b, then c.
    pub fn then(mut self, next: Candidate) -> Self {
        let mut tail = &mut self;
        while tail.successor.is_some() {
            tail = tail.successor.as_mut().unwrap();
        }
        tail.successor = Some(Box::new(next));
        self
    }

    pub fn health_key(&self) -> Option<HealthKey> {
        self.endpoint.health_key()
    }

    /// Whether this node is a bare terminal direct candidate.
    pub fn is_terminal_direct(&self) -> bool {
        self.endpoint.is_direct() && self.successor.is_none()
    }

    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            next: Some(self),
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A chain always contains at least its head node.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Endpoints in try-order, useful for logging and assertions.
    pub fn endpoints(&self) -> Vec<&Endpoint> {
        self.iter().map(|c| &c.endpoint).collect()
    }

    /// Whether the terminal candidate of this chain is direct.
    pub fn ends_in_direct(&self) -> bool {
        self.iter()
            .last()
            .map(|c| c.endpoint.is_direct())
            .unwrap_or(false)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", node.endpoint)?;
        }
        Ok(())
    }
}

/// Borrowing iterator over a chain, head to terminal.
pub struct ChainIter<'a> {
    next: Option<&'a Candidate>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Candidate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.successor.as_deref();
        Some(current)
    }
}

/// Origin of the configuration that produced a chain. Echoed on emitted
/// events so consumers can attribute state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Opaque identifier of the configuring party (e.g. an extension id).
    Id(String),
    /// Enterprise policy supplied the configuration.
    Policy,
    /// User preferences supplied the configuration.
    Preferences,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Id(id) => f.write_str(id),
            ConfigSource::Policy => f.write_str("policy"),
            ConfigSource::Preferences => f.write_str("preferences"),
        }
    }
}

/// Identity of one routing decision, used to correlate outcome reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_has_no_health_key() {
        assert!(Endpoint::Direct.health_key().is_none());
    }

    #[test]
    fn test_proxy_health_key_is_canonical() {
        let key = Endpoint::proxy(ProxyScheme::Socks5, "relay.example", 1080)
            .health_key()
            .unwrap();
        assert_eq!(key.to_string(), "socks5://relay.example:1080");
    }

    #[test]
    fn test_direct_never_equals_proxy() {
        let direct = Endpoint::Direct;
        let proxy = Endpoint::proxy(ProxyScheme::Http, "direct", 0);
        assert_ne!(direct, proxy);
    }

    #[test]
    fn test_chain_builder_preserves_try_order() {
        let chain = Candidate::proxy(ProxyScheme::Http, "a", 8080)
            .then(Candidate::proxy(ProxyScheme::Http, "b", 8080))
            .then(Candidate::direct());
        let rendered: Vec<String> = chain.endpoints().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["http://a:8080", "http://b:8080", "direct"]
        );
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_terminal_direct_detection() {
        let bare = Candidate::direct();
        assert!(bare.is_terminal_direct());

        let linked = Candidate::direct().then(Candidate::proxy(ProxyScheme::Http, "a", 1));
        assert!(!linked.is_terminal_direct());

        let proxy = Candidate::proxy(ProxyScheme::Http, "a", 1);
        assert!(!proxy.is_terminal_direct());
    }

    #[test]
    fn test_chain_display() {
        let chain = Candidate::proxy(ProxyScheme::Https, "p", 443).then(Candidate::direct());
        assert_eq!(chain.to_string(), "https://p:443 -> direct");
    }

    #[test]
    fn test_health_key_serde_round_trip() {
        let key = HealthKey {
            scheme: ProxyScheme::Socks4,
            host: "h".into(),
            port: 9,
        };
        let json = serde_json::to_string(&key).unwrap();
        let back: HealthKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}

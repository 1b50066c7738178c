//! Chain pruning.
//!
//! Given a request's default candidate chain and the failure registry,
//! build the chain actually handed to the transport: drop disabled
//! candidates, keep the survivors in their original order, and make sure
//! the result can always degrade to a direct connection. Some failures
//! (connecting to a dead or non-proxy port) are undetectable before the
//! connection is attempted, so the terminal direct hop is non-negotiable.

use crate::candidate::{Candidate, HealthKey};
use crate::clock::EpochMillis;
use crate::health::{HealthRegistry, KeyHealth};

/// The pruned route for one request.
#[derive(Debug, PartialEq, Eq)]
pub enum PrunedChain {
    /// At least one candidate survived; the chain ends in a direct hop.
    Routed(Candidate),
    /// Every candidate was disabled. The caller substitutes a bare
    /// direct-only path.
    NoRoute,
}

/// Result of pruning, including the keys whose expired records were
/// evicted along the way (those candidates are live again and the caller
/// may want to announce that).
#[derive(Debug)]
pub struct PruneOutcome {
    pub chain: PrunedChain,
    pub reenabled: Vec<HealthKey>,
}

/// Prune `chain` against `registry`.
///
/// The input chain is consumed; surviving nodes are relinked in place via
/// their exclusively-owned successor links. Survivor order is always the
/// original relative order.
pub fn prune(chain: Candidate, registry: &mut HealthRegistry, now: EpochMillis) -> PruneOutcome {
    let mut reenabled = Vec::new();

    // Sever the chain into nodes, keeping the usable ones in order.
    let mut survivors: Vec<Box<Candidate>> = Vec::new();
    let mut cursor = Some(Box::new(chain));
    while let Some(mut node) = cursor {
        cursor = node.successor.take();
        let keep = match node.health_key() {
            // Direct candidates carry no key and are never disableable.
            None => true,
            Some(key) => match registry.probe(&key, now) {
                KeyHealth::Ok => true,
                KeyHealth::Disabled => {
                    tracing::debug!(key = %key, "pruning disabled candidate");
                    false
                }
                KeyHealth::Expired => {
                    reenabled.push(key);
                    true
                }
            },
        };
        if keep {
            survivors.push(node);
        }
    }

    if survivors.is_empty() {
        return PruneOutcome {
            chain: PrunedChain::NoRoute,
            reenabled,
        };
    }

    // A surviving tail that is not a bare direct candidate gets a synthetic
    // one appended; a chain already ending in direct is left untouched.
    let needs_direct_tail = survivors
        .last()
        .map(|tail| !tail.endpoint.is_direct())
        .unwrap_or(false);
    if needs_direct_tail {
        survivors.push(Box::new(Candidate::direct()));
    }

    // Relink back to front.
    let mut next: Option<Box<Candidate>> = None;
    for mut node in survivors.into_iter().rev() {
        node.successor = next;
        next = Some(node);
    }

    match next {
        Some(head) => PruneOutcome {
            chain: PrunedChain::Routed(*head),
            reenabled,
        },
        None => PruneOutcome {
            chain: PrunedChain::NoRoute,
            reenabled,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ProxyScheme;

    const TTL: u64 = 48 * 60 * 60 * 1000;

    fn proxy(host: &str) -> Candidate {
        Candidate::proxy(ProxyScheme::Http, host, 8080)
    }

    fn key_of(host: &str) -> HealthKey {
        proxy(host).health_key().unwrap()
    }

    fn routed(outcome: PruneOutcome) -> Candidate {
        match outcome.chain {
            PrunedChain::Routed(c) => c,
            PrunedChain::NoRoute => panic!("expected a routed chain"),
        }
    }

    fn rendered(chain: &Candidate) -> Vec<String> {
        chain.endpoints().iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_healthy_chain_is_noop_apart_from_terminal_fixup() {
        let mut reg = HealthRegistry::new(TTL);
        let chain = proxy("a").then(proxy("b"));
        let out = routed(prune(chain, &mut reg, 0));
        assert_eq!(
            rendered(&out),
            vec!["http://a:8080", "http://b:8080", "direct"]
        );
    }

    #[test]
    fn test_chain_already_ending_in_direct_is_untouched() {
        let mut reg = HealthRegistry::new(TTL);
        let chain = proxy("a").then(Candidate::direct());
        let out = routed(prune(chain, &mut reg, 0));
        assert_eq!(rendered(&out), vec!["http://a:8080", "direct"]);
    }

    #[test]
    fn test_disabled_middle_candidate_is_skipped() {
        let mut reg = HealthRegistry::new(TTL);
        reg.mark_failed(&key_of("b"), 0);

        let chain = proxy("a").then(proxy("b")).then(Candidate::direct());
        let out = routed(prune(chain, &mut reg, 0));
        assert_eq!(rendered(&out), vec!["http://a:8080", "direct"]);
    }

    #[test]
    fn test_survivor_order_is_preserved() {
        let mut reg = HealthRegistry::new(TTL);
        reg.mark_failed(&key_of("b"), 0);
        reg.mark_failed(&key_of("d"), 0);

        let chain = proxy("a")
            .then(proxy("b"))
            .then(proxy("c"))
            .then(proxy("d"))
            .then(proxy("e"));
        let out = routed(prune(chain, &mut reg, 0));
        assert_eq!(
            rendered(&out),
            vec!["http://a:8080", "http://c:8080", "http://e:8080", "direct"]
        );
    }

    #[test]
    fn test_all_disabled_yields_no_route() {
        let mut reg = HealthRegistry::new(TTL);
        reg.mark_failed(&key_of("a"), 0);
        reg.mark_failed(&key_of("b"), 0);

        let chain = proxy("a").then(proxy("b"));
        let out = prune(chain, &mut reg, 0);
        assert_eq!(out.chain, PrunedChain::NoRoute);
    }

    #[test]
    fn test_direct_members_always_survive() {
        let mut reg = HealthRegistry::new(TTL);
        reg.mark_failed(&key_of("a"), 0);

        let chain = proxy("a").then(Candidate::direct());
        let out = routed(prune(chain, &mut reg, 0));
        assert_eq!(rendered(&out), vec!["direct"]);
    }

    #[test]
    fn test_expired_record_revives_candidate_and_reports_it() {
        let mut reg = HealthRegistry::new(TTL);
        reg.mark_failed(&key_of("a"), 0);

        let chain = proxy("a").then(Candidate::direct());
        let out = prune(chain, &mut reg, TTL + 1);
        assert_eq!(out.reenabled, vec![key_of("a")]);
        match out.chain {
            PrunedChain::Routed(c) => {
                assert_eq!(rendered(&c), vec!["http://a:8080", "direct"])
            }
            PrunedChain::NoRoute => panic!("expected a routed chain"),
        }
    }

    #[test]
    fn test_single_proxy_without_fallback_gains_direct_tail() {
        let mut reg = HealthRegistry::new(TTL);
        let out = routed(prune(proxy("a"), &mut reg, 0));
        assert_eq!(rendered(&out), vec!["http://a:8080", "direct"]);
    }

    #[test]
    fn test_bare_direct_chain_is_stable() {
        let mut reg = HealthRegistry::new(TTL);
        let out = routed(prune(Candidate::direct(), &mut reg, 0));
        assert_eq!(rendered(&out), vec!["direct"]);
    }
}

//! Heuristic OS identification.
//!
//! Each [`Scorer`] looks at one kind of evidence and casts weighted votes for
//! OS families. The engine sums the votes and the family with the largest
//! total wins; its share of the total becomes the confidence. Everything here
//! is pure, so identical inputs always produce identical guesses.

use std::collections::{BTreeMap, BTreeSet};

use lanscope_common::network::device::{OsFamily, OsGuess};

const TTL_WEIGHT: f64 = 0.35;
const PORT_SIGNATURE_WEIGHT: f64 = 0.45;
const BANNER_WEIGHT: f64 = 0.9;
const MIN_SIGNATURE_OVERLAP: f64 = 0.5;
const EPSILON: f64 = 1e-9;

const PORT_SIGNATURES: &[(OsFamily, &[u16])] = &[
    (OsFamily::Windows, &[135, 139, 445, 3389]),
    (OsFamily::Windows, &[80, 443, 445]),
    (OsFamily::Windows, &[88, 389, 445]),
    (OsFamily::Unix, &[22, 111, 2049]),
    (OsFamily::Unix, &[22, 25, 80]),
    (OsFamily::Apple, &[22, 548, 5009, 7000]),
    (OsFamily::Apple, &[62078]),
    (OsFamily::NetworkAppliance, &[22, 23, 80, 443]),
    (OsFamily::NetworkAppliance, &[23, 161, 179]),
];

const BANNER_KEYWORDS: &[(OsFamily, &[&str])] = &[
    (OsFamily::Windows, &["microsoft", "windows", "iis"]),
    (
        OsFamily::Unix,
        &["linux", "ubuntu", "debian", "centos", "fedora", "red hat", "freebsd", "openbsd", "netbsd"],
    ),
    (OsFamily::Apple, &["darwin", "mac os", "macos"]),
    (OsFamily::NetworkAppliance, &["cisco", "juniper", "mikrotik", "routeros", "huawei"]),
];

/// What the engine knows about a host.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub ttl: Option<u8>,
    pub open_ports: &'a BTreeSet<u16>,
    pub banners: &'a BTreeMap<u16, String>,
}

/// Evidence kinds, ordered by how much a tie should trust them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    Ttl,
    PortSignature,
    Banner,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub family: OsFamily,
    pub weight: f64,
    pub signal: Signal,
}

pub trait Scorer: Send + Sync {
    fn signal(&self) -> Signal;
    fn score(&self, input: &FingerprintInput<'_>) -> Vec<Vote>;
}

/// Default initial TTLs differ per stack: 64 on Unix-likes, 128 on Windows,
/// 255 on most routers and switches. Each hop only lowers them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtlScorer;

impl Scorer for TtlScorer {
    fn signal(&self) -> Signal {
        Signal::Ttl
    }

    fn score(&self, input: &FingerprintInput<'_>) -> Vec<Vote> {
        let family = match input.ttl {
            Some(1..=64) => OsFamily::Unix,
            Some(65..=128) => OsFamily::Windows,
            Some(129..=255) => OsFamily::NetworkAppliance,
            Some(0) | None => return Vec::new(),
        };
        vec![Vote {
            family,
            weight: TTL_WEIGHT,
            signal: Signal::Ttl,
        }]
    }
}

/// Votes for the family of the best matching port signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortSignatureScorer;

impl Scorer for PortSignatureScorer {
    fn signal(&self) -> Signal {
        Signal::PortSignature
    }

    fn score(&self, input: &FingerprintInput<'_>) -> Vec<Vote> {
        let mut best: Option<(OsFamily, f64)> = None;

        for (family, signature) in PORT_SIGNATURES {
            let hits = signature.iter().filter(|p| input.open_ports.contains(p)).count();
            let overlap = hits as f64 / signature.len() as f64;
            if overlap + EPSILON < MIN_SIGNATURE_OVERLAP {
                continue;
            }
            // First entry wins on equal overlap, keeping the result stable.
            if best.is_none_or(|(_, current)| overlap > current + EPSILON) {
                best = Some((*family, overlap));
            }
        }

        best.map(|(family, overlap)| Vote {
            family,
            weight: PORT_SIGNATURE_WEIGHT * overlap,
            signal: Signal::PortSignature,
        })
        .into_iter()
        .collect()
    }
}

/// Case-insensitive keyword search over captured banners. A banner naming
/// its OS is the most direct evidence there is.
#[derive(Debug, Default, Clone, Copy)]
pub struct BannerScorer;

impl Scorer for BannerScorer {
    fn signal(&self) -> Signal {
        Signal::Banner
    }

    fn score(&self, input: &FingerprintInput<'_>) -> Vec<Vote> {
        if input.banners.is_empty() {
            return Vec::new();
        }
        let lowered: Vec<String> = input.banners.values().map(|b| b.to_lowercase()).collect();
        let total = lowered.len() as f64;

        BANNER_KEYWORDS
            .iter()
            .filter_map(|(family, keywords)| {
                let matching = lowered
                    .iter()
                    .filter(|banner| keywords.iter().any(|k| banner.contains(k)))
                    .count();
                (matching > 0).then(|| Vote {
                    family: *family,
                    weight: BANNER_WEIGHT * matching as f64 / total,
                    signal: Signal::Banner,
                })
            })
            .collect()
    }
}

pub struct FingerprintEngine {
    scorers: Vec<Box<dyn Scorer>>,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(vec![
            Box::new(TtlScorer),
            Box::new(PortSignatureScorer),
            Box::new(BannerScorer),
        ])
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: f64,
    /// Strongest signal that voted for this family.
    best_signal: Option<Signal>,
}

impl FingerprintEngine {
    pub fn new(scorers: Vec<Box<dyn Scorer>>) -> Self {
        Self { scorers }
    }

    pub fn identify(&self, input: &FingerprintInput<'_>) -> OsGuess {
        let mut tallies: BTreeMap<OsFamily, Tally> = BTreeMap::new();
        let mut grand_total = 0.0;

        for vote in self.scorers.iter().flat_map(|s| s.score(input)) {
            if vote.weight <= 0.0 || vote.family == OsFamily::Unknown {
                continue;
            }
            let tally = tallies.entry(vote.family).or_default();
            tally.total += vote.weight;
            tally.best_signal = tally.best_signal.max(Some(vote.signal));
            grand_total += vote.weight;
        }

        // BTreeMap iterates in family order, so the first family seen wins
        // once score and signal priority are level.
        let mut winner: Option<(OsFamily, Tally)> = None;
        for (family, tally) in tallies {
            let replace = match &winner {
                None => true,
                Some((_, best)) if tally.total > best.total + EPSILON => true,
                Some((_, best)) if (tally.total - best.total).abs() <= EPSILON => {
                    tally.best_signal > best.best_signal
                }
                Some(_) => false,
            };
            if replace {
                winner = Some((family, tally));
            }
        }

        match winner {
            Some((family, tally)) if grand_total > 0.0 => OsGuess::new(family, tally.total / grand_total),
            _ => OsGuess::unknown(),
        }
    }
}

/// Runs the default scorers.
pub fn identify(
    ttl: Option<u8>,
    open_ports: &BTreeSet<u16>,
    banners: &BTreeMap<u16, String>,
) -> OsGuess {
    FingerprintEngine::default().identify(&FingerprintInput {
        ttl,
        open_ports,
        banners,
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

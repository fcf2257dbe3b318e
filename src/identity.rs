//! Athlete identity resolution
//!
//! Vendor payloads carry loosely-identified athlete names with no
//! authoritative identifier. This module matches those vendor-local
//! identities to canonical profiles: normalize both names, score similarity
//! (exact / substring / Levenshtein ladder), keep the best profile per
//! candidate, and gate proposals behind thresholds.
//!
//! Matching is deliberately greedy best-match-only rather than a global
//! optimal assignment. Collisions between source identities are rare and
//! surface to a human reviewer through the ranked proposal list.

use crate::types::{CanonicalProfile, IdentityCandidate, MatchProposal, RawRecord};
use std::collections::HashSet;

/// Proposals scoring below this are discarded entirely
pub const MIN_CANDIDATE_SCORE: u8 = 50;

/// Proposals at or above this score are flagged for automatic acceptance
pub const AUTO_ACCEPT_SCORE: u8 = 80;

/// Payload keys that may carry the vendor-local athlete id
const SOURCE_ID_KEYS: &[&str] = &["profileId", "athleteId"];

/// Payload keys that may carry the vendor-local athlete name
const SOURCE_NAME_KEYS: &[&str] = &["profileName", "athleteName"];

/// The vendor-local (source id, source name) pair carried by a record, if
/// both fields are present
pub fn source_identity(record: &RawRecord) -> Option<(String, String)> {
    let id = first_string(record, SOURCE_ID_KEYS)?;
    let name = first_string(record, SOURCE_NAME_KEYS)?;
    Some((id, name))
}

/// Normalize a name for comparison: lowercase, then keep only lowercase
/// Latin letters, Hangul syllables, and digits.
///
/// Both sides of every comparison go through this; comparing a normalized
/// string against a raw one is a bug, not an acceptable variance.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || ('가'..='힣').contains(c))
        .collect()
}

/// Similarity score between two names, 0-100.
///
/// 100 for identical normalized strings, 90 when one contains the other,
/// otherwise a Levenshtein ratio against the longer string. Two empty
/// normalized strings score 0 so downstream sorting always has a total
/// order.
pub fn similarity(a: &str, b: &str) -> u8 {
    let na = normalize_name(a);
    let nb = normalize_name(b);

    if na.is_empty() && nb.is_empty() {
        return 0;
    }
    if na == nb {
        return 100;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return 90;
    }

    let max_len = na.chars().count().max(nb.chars().count());
    let distance = levenshtein(&na, &nb);
    ((max_len.saturating_sub(distance)) as f64 / max_len as f64 * 100.0).round() as u8
}

/// Levenshtein edit distance, two-row form
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Resolves unlinked vendor identities against canonical profiles
pub struct IdentityResolver;

impl IdentityResolver {
    /// Harvest unlinked identity candidates from raw records.
    ///
    /// One candidate per unique source id, first occurrence wins; ids in
    /// `linked` (already written to a profile) never reappear.
    pub fn harvest(records: &[RawRecord], linked: &HashSet<String>) -> Vec<IdentityCandidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for record in records {
            let Some((source_id, source_name)) = source_identity(record) else {
                continue;
            };
            if linked.contains(&source_id) || !seen.insert(source_id.clone()) {
                continue;
            }
            candidates.push(IdentityCandidate {
                source_id,
                source_name,
            });
        }

        candidates
    }

    /// Score every candidate against every unlinked profile and keep the
    /// single best profile per candidate.
    ///
    /// Ties keep the profile encountered first (deterministic, not random).
    /// Candidates whose best score is below [`MIN_CANDIDATE_SCORE`] are
    /// discarded, not errored. The result is sorted by descending
    /// similarity so reviewers process highest-confidence matches first.
    pub fn resolve_all(
        candidates: &[IdentityCandidate],
        profiles: &[CanonicalProfile],
    ) -> Vec<MatchProposal> {
        let unlinked: Vec<&CanonicalProfile> =
            profiles.iter().filter(|p| p.source_id.is_none()).collect();

        let mut proposals = Vec::new();

        for candidate in candidates {
            let mut best: Option<(&CanonicalProfile, u8)> = None;

            for &profile in &unlinked {
                let score = similarity(&candidate.source_name, &profile.name);
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((profile, score));
                }
            }

            if let Some((profile, score)) = best {
                if score >= MIN_CANDIDATE_SCORE {
                    proposals.push(MatchProposal {
                        source_id: candidate.source_id.clone(),
                        source_name: candidate.source_name.clone(),
                        profile_id: profile.id,
                        profile_name: profile.name.clone(),
                        similarity: score,
                        auto_accept: score >= AUTO_ACCEPT_SCORE,
                    });
                }
            }
        }

        proposals.sort_by(|a, b| b.similarity.cmp(&a.similarity));
        proposals
    }
}

fn first_string(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| record.metrics.get(k))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

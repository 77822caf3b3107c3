//! Domain vocabulary shared by ingestion, statistics, and prediction:
//! vote decision normalization, party code resolution, member slugs, and
//! content-addressed bill hashes.

pub mod decision;
pub mod party;
pub mod slug;

pub use decision::{normalize_decision, RawDecision, VoteDecision};
pub use party::{current_party_from_factions, party_names, resolve_party, FactionMembership, NON_AFFILIATED, VALID_PARTY_CODES};
pub use slug::make_slug;

use sha2::{Digest, Sha256};

/// Content-addressed bill identity: sha256 over the non-empty parts of
/// `title|description|full_text`, truncated to 16 hex chars.
pub fn bill_hash(title: &str, description: Option<&str>, full_text: Option<&str>) -> String {
    let text: Vec<&str> = [Some(title), description, full_text]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    let digest = Sha256::digest(text.join("|").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

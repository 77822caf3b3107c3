//! Vote decision normalization
//!
//! The upstream API reports decisions in several shapes: Estonian tokens
//! (`POOLT`, `VASTU`, ...), single-letter codes, structured `{code, value}`
//! objects, or nothing at all. Everything funnels into the closed
//! [`VoteDecision`] enum. Unknown markers map to `Absent` — an unrecognized
//! vote marker is never more informative than "did not vote".

use serde::{Deserialize, Serialize};

/// Normalized vote decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteDecision {
    #[serde(rename = "FOR")]
    For,
    #[serde(rename = "AGAINST")]
    Against,
    #[serde(rename = "ABSTAIN")]
    Abstain,
    #[serde(rename = "ABSENT")]
    Absent,
}

impl VoteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDecision::For => "FOR",
            VoteDecision::Against => "AGAINST",
            VoteDecision::Abstain => "ABSTAIN",
            VoteDecision::Absent => "ABSENT",
        }
    }
}

impl std::fmt::Display for VoteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw decision value as it appears in upstream payloads
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDecision {
    Text(String),
    Structured {
        code: Option<String>,
        value: Option<String>,
    },
}

impl RawDecision {
    fn token(&self) -> &str {
        match self {
            RawDecision::Text(s) => s,
            RawDecision::Structured { code, value } => code
                .as_deref()
                .or(value.as_deref())
                .unwrap_or(""),
        }
    }
}

/// Normalize a raw decision into the closed enum.
///
/// Total and idempotent: every supported token (Estonian, single-letter,
/// or already-normalized English) maps to the same variant on repeated
/// application; `None` and unknown strings map to `Absent`.
pub fn normalize_decision(raw: Option<&RawDecision>) -> VoteDecision {
    let Some(raw) = raw else {
        return VoteDecision::Absent;
    };
    match raw.token().trim().to_uppercase().as_str() {
        "POOLT" | "FOR" | "P" | "KOHAL" => VoteDecision::For,
        "VASTU" | "AGAINST" | "V" => VoteDecision::Against,
        "ERAPOOLETU" | "ABSTAIN" | "E" => VoteDecision::Abstain,
        "PUUDUB" | "PUUDUS" | "ABSENT" | "-" => VoteDecision::Absent,
        _ => VoteDecision::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawDecision {
        RawDecision::Text(s.to_string())
    }

    #[test]
    fn estonian_tokens_normalize() {
        assert_eq!(normalize_decision(Some(&text("POOLT"))), VoteDecision::For);
        assert_eq!(normalize_decision(Some(&text("VASTU"))), VoteDecision::Against);
        assert_eq!(normalize_decision(Some(&text("ERAPOOLETU"))), VoteDecision::Abstain);
        assert_eq!(normalize_decision(Some(&text("PUUDUB"))), VoteDecision::Absent);
        assert_eq!(normalize_decision(Some(&text("PUUDUS"))), VoteDecision::Absent);
    }

    #[test]
    fn single_letter_codes_normalize() {
        assert_eq!(normalize_decision(Some(&text("P"))), VoteDecision::For);
        assert_eq!(normalize_decision(Some(&text("V"))), VoteDecision::Against);
        assert_eq!(normalize_decision(Some(&text("E"))), VoteDecision::Abstain);
        assert_eq!(normalize_decision(Some(&text("-"))), VoteDecision::Absent);
    }

    #[test]
    fn case_folding_and_trimming() {
        assert_eq!(normalize_decision(Some(&text("  poolt "))), VoteDecision::For);
        assert_eq!(normalize_decision(Some(&text("kohal"))), VoteDecision::For);
    }

    #[test]
    fn normalization_is_idempotent() {
        for token in ["POOLT", "VASTU", "ERAPOOLETU", "PUUDUB", "P", "V", "E", "-"] {
            let first = normalize_decision(Some(&text(token)));
            let second = normalize_decision(Some(&text(first.as_str())));
            assert_eq!(first, second, "token {token} not idempotent");
        }
    }

    #[test]
    fn unknown_and_none_are_absent() {
        assert_eq!(normalize_decision(None), VoteDecision::Absent);
        assert_eq!(normalize_decision(Some(&text(""))), VoteDecision::Absent);
        assert_eq!(normalize_decision(Some(&text("MAYBE"))), VoteDecision::Absent);
    }

    #[test]
    fn structured_values_prefer_code() {
        let raw = RawDecision::Structured {
            code: Some("VASTU".to_string()),
            value: Some("Poolt".to_string()),
        };
        assert_eq!(normalize_decision(Some(&raw)), VoteDecision::Against);

        let raw = RawDecision::Structured {
            code: None,
            value: Some("erapooletu".to_string()),
        };
        assert_eq!(normalize_decision(Some(&raw)), VoteDecision::Abstain);
    }
}

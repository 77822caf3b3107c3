//! Party code resolution
//!
//! Faction labels arrive as free text ("Eesti Reformierakonna fraktsioon")
//! and are mapped onto a small fixed set of party codes by ordered
//! substring rules. Labels captured on historic vote records are kept
//! verbatim and re-resolved on every pass, so a rule change retroactively
//! reclassifies old votes instead of leaving them drifting.

/// The fixed set of valid party codes
pub const VALID_PARTY_CODES: [&str; 8] = ["EKRE", "I", "RE", "SDE", "K", "E200", "PAREMPOOLSED", "FR"];

/// Bucket for members without an active faction
pub const NON_AFFILIATED: &str = "FR";

/// Ordered substring rules. More specific patterns sharing substrings must
/// come before generic ones ("Konservatiiv" before "Kesk" is irrelevant,
/// but "200" must not be shadowed etc.), so order is load-bearing.
const PARTY_CODE_PATTERNS: [(&str, &str); 9] = [
    ("konservatiiv", "EKRE"),
    ("ekre", "EKRE"),
    ("isamaa", "I"),
    ("reform", "RE"),
    ("sotsiaaldemokraat", "SDE"),
    ("kesk", "K"),
    ("200", "E200"),
    ("paremp", "PAREMPOOLSED"),
    ("mittekuuluv", "FR"),
];

/// Estonian / English display names per party code
pub fn party_names(code: &str) -> Option<(&'static str, &'static str)> {
    match code {
        "EKRE" => Some(("Eesti Konservatiivne Rahvaerakond", "Estonian Conservative People's Party")),
        "I" => Some(("Isamaa Erakond", "Isamaa Party")),
        "RE" => Some(("Eesti Reformierakond", "Estonian Reform Party")),
        "SDE" => Some(("Sotsiaaldemokraatlik Erakond", "Social Democratic Party")),
        "K" => Some(("Eesti Keskerakond", "Estonian Centre Party")),
        "E200" => Some(("Eesti 200", "Estonia 200")),
        "PAREMPOOLSED" => Some(("Parempoolsed", "Right-wing")),
        "FR" => Some(("Fraktsioonitud", "Non-affiliated")),
        _ => None,
    }
}

/// Resolve a faction label to a party code.
///
/// Idempotent on already-valid codes; empty or missing labels resolve to
/// [`NON_AFFILIATED`].
pub fn resolve_party(faction_label: Option<&str>) -> &'static str {
    let Some(label) = faction_label else {
        return NON_AFFILIATED;
    };
    let stripped = label.trim();
    if stripped.is_empty() {
        return NON_AFFILIATED;
    }
    if let Some(code) = VALID_PARTY_CODES.iter().find(|c| **c == stripped) {
        return code;
    }
    let lower = stripped.to_lowercase();
    for (pattern, code) in PARTY_CODE_PATTERNS {
        if lower.contains(pattern) {
            return code;
        }
    }
    NON_AFFILIATED
}

/// One faction membership from a member detail payload
#[derive(Debug, Clone)]
pub struct FactionMembership {
    pub name: String,
    /// `None` while the membership is still active
    pub end_date: Option<String>,
}

/// Pick a member's current party from their faction membership list.
///
/// Only active memberships (no end date) count. An active non-affiliated
/// membership is kept as a fallback and used only when no other active
/// membership exists. Ended memberships are ignored here entirely; they
/// still matter historically through the faction labels captured on each
/// vote record.
pub fn current_party_from_factions(factions: &[FactionMembership]) -> &'static str {
    let mut fallback = None;
    for f in factions {
        if f.end_date.is_some() {
            continue;
        }
        if f.name.to_lowercase().contains("mittekuuluv") {
            fallback = Some(NON_AFFILIATED);
        } else {
            return resolve_party(Some(&f.name));
        }
    }
    fallback.unwrap_or(NON_AFFILIATED)
}

//! URL-friendly member slugs

/// Build a slug from a member's first and last name.
///
/// Lowercases, transliterates Estonian diacritics to ASCII, drops any other
/// non-alphanumeric characters, and collapses/trims hyphen runs.
/// Deterministic: the same name always produces the same slug.
pub fn make_slug(first_name: &str, last_name: &str) -> String {
    let raw = format!("{}-{}", first_name, last_name).to_lowercase();

    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            'ä' | 'å' | 'á' | 'à' => out.push('a'),
            'ö' | 'õ' | 'ó' | 'ò' => out.push('o'),
            'ü' | 'ú' | 'ù' => out.push('u'),
            'é' | 'è' | 'ë' => out.push('e'),
            'š' => out.push('s'),
            'ž' => out.push('z'),
            'a'..='z' | '0'..='9' | '-' => out.push(c),
            _ => {}
        }
    }

    // Collapse hyphen runs and trim
    let mut slug = String::with_capacity(out.len());
    let mut prev_hyphen = false;
    for c in out.chars() {
        if c == '-' {
            if !prev_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            prev_hyphen = true;
        } else {
            slug.push(c);
            prev_hyphen = false;
        }
    }
    slug.trim_end_matches('-').to_string()
}

//! Token-set similarity used to fold name variants together.

use rapidfuzz::distance::indel;

/// Minimum score for two names to be treated as the same thing.
pub const FUZZ_THRESHOLD: f64 = 85.7;

/// Lower-case, turn every non-alphanumeric char into a space, trim.
pub fn default_process(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.trim().to_string()
}

/// Token-set ratio in `0.0..=100.0` over processed inputs.
///
/// A name whose tokens are a subset of the other's scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = default_process(a);
    let b = default_process(b);
    let tokens_a = sorted_tokens(&a);
    let tokens_b = sorted_tokens(&b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a
        .iter()
        .filter(|t| tokens_b.contains(t))
        .copied()
        .collect();
    let diff_ab: Vec<&str> = tokens_a
        .iter()
        .filter(|t| !tokens_b.contains(t))
        .copied()
        .collect();
    let diff_ba: Vec<&str> = tokens_b
        .iter()
        .filter(|t| !tokens_a.contains(t))
        .copied()
        .collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let sect = intersection.join(" ");
    let ab = diff_ab.join(" ");
    let ba = diff_ba.join(" ");
    if sect.is_empty() {
        return ratio(&ab, &ba);
    }

    let sect_ab = format!("{sect} {ab}");
    let sect_ba = format!("{sect} {ba}");
    ratio(&sect_ab, &sect_ba)
        .max(ratio(&sect, &sect_ab))
        .max(ratio(&sect, &sect_ba))
}

/// First candidate with the highest score at or above `cutoff`.
pub fn extract_one<'c, I>(query: &str, candidates: I, cutoff: f64) -> Option<(&'c str, f64)>
where
    I: IntoIterator<Item = &'c str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = token_set_ratio(query, candidate);
        if score < cutoff {
            continue;
        }
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best
}

fn sorted_tokens(text: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// Indel similarity scaled to `0.0..=100.0`.
fn ratio(a: &str, b: &str) -> f64 {
    100.0 * indel::normalized_similarity(a.chars(), b.chars())
}

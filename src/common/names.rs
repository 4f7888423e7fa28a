//! Tunnel id validation and random id generation

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

pub const ADJECTIVES: [&str; 18] = [
    "angry",
    "brave",
    "calm",
    "delightful",
    "eager",
    "fierce",
    "gentle",
    "happy",
    "jolly",
    "kind",
    "lively",
    "nice",
    "proud",
    "silly",
    "thankful",
    "victorious",
    "witty",
    "zealous",
];

pub const COLORS: [&str; 10] = [
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "brown", "grey", "black",
];

pub const ANIMALS: [&str; 12] = [
    "tiger", "lion", "elephant", "monkey", "panda", "koala", "giraffe", "zebra", "wolf", "fox",
    "bear", "rabbit",
];

/// Subdomain-safe tunnel id shape
static ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9][a-z0-9-]{1,61}[a-z0-9]|[a-z0-9]{4,63})$").unwrap()
});

/// Validate a client-chosen tunnel id: 4-63 chars, lowercase alphanumeric
/// plus interior hyphens, alphanumeric at both ends.
pub fn is_valid_id(id: &str) -> bool {
    id.len() >= 4 && id.len() <= 63 && ID_RE.is_match(id)
}

/// Generate a `<adjective>-<color>-<animal>` id from the closed word lists.
/// No collision check here; the allocation path reports conflicts.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-{}-{}",
        ADJECTIVES.choose(&mut rng).unwrap(),
        COLORS.choose(&mut rng).unwrap(),
        ANIMALS.choose(&mut rng).unwrap()
    )
}

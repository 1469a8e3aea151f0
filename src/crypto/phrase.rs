//! Recovery phrases: generation, normalisation and the lookup digest.

use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::kek::{derive_subkey, PHRASE_LOOKUP_LABEL};
use crate::error::{AppError, Result};

/// Words per phrase. 12 words over a 64-word list give 72 bits.
pub const PHRASE_WORDS: usize = 12;

const WORDS: [&str; 64] = [
    "amber", "anchor", "atlas", "basalt", "beacon", "birch", "cedar", "cinder",
    "cobalt", "comet", "coral", "cypher", "delta", "dune", "ember", "falcon",
    "fern", "fjord", "flint", "gale", "garnet", "glacier", "granite", "harbor",
    "hazel", "heron", "indigo", "iris", "jasper", "juniper", "kelp", "kestrel",
    "lagoon", "lantern", "lichen", "lumen", "marble", "meadow", "mica", "nebula",
    "nimbus", "oak", "obsidian", "onyx", "orbit", "pebble", "pine", "prism",
    "quartz", "raven", "reef", "sable", "sierra", "slate", "spruce", "summit",
    "tundra", "umber", "vapor", "willow", "xenon", "yarrow", "zenith", "zephyr",
];

/// Generates a fresh recovery phrase.
pub fn generate() -> Zeroizing<String> {
    let words: Vec<&str> = (0..PHRASE_WORDS)
        .map(|_| WORDS[OsRng.gen_range(0..WORDS.len())])
        .collect();
    Zeroizing::new(words.join(" "))
}

/// Lower-cases and collapses whitespace, rejecting phrases that cannot be ours.
pub fn normalize(phrase: &str) -> Result<Zeroizing<String>> {
    let words: Vec<String> = phrase
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect();

    if words.len() != PHRASE_WORDS {
        return Err(AppError::validation(format!(
            "Recovery phrase must contain {} words",
            PHRASE_WORDS
        )));
    }

    if words.iter().any(|w| !WORDS.contains(&w.as_str())) {
        return Err(AppError::validation("Recovery phrase contains unknown words"));
    }

    Ok(Zeroizing::new(words.join(" ")))
}

/// Deterministic digest used only to find the wallet row.
///
/// Keyed with a pepper derived from the master key; the slow salted hash is
/// what actually authenticates the phrase.
pub fn lookup_digest(master_key: &[u8], normalized: &str) -> String {
    let pepper = derive_subkey(master_key, PHRASE_LOOKUP_LABEL);
    let mut hasher = Sha256::new();
    hasher.update(pepper.as_slice());
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_phrase_normalizes_to_itself() {
        let phrase = generate();
        assert_eq!(phrase.split(' ').count(), PHRASE_WORDS);
        assert_eq!(normalize(&phrase).unwrap().as_str(), phrase.as_str());
    }

    #[test]
    fn normalisation_ignores_case_and_spacing() {
        let phrase = "amber Anchor  atlas basalt beacon birch cedar cinder cobalt comet coral  CYPHER";
        assert_eq!(
            normalize(phrase).unwrap().as_str(),
            "amber anchor atlas basalt beacon birch cedar cinder cobalt comet coral cypher"
        );
    }

    #[test]
    fn wrong_length_or_unknown_words_rejected() {
        assert!(normalize("amber anchor").is_err());
        let phrase = "amber anchor atlas basalt beacon birch cedar cinder cobalt comet coral bitcoin";
        assert!(normalize(phrase).is_err());
    }

    #[test]
    fn lookup_digest_depends_on_master_key() {
        let phrase = generate();
        let a = lookup_digest(&[1u8; 32], &phrase);
        assert_eq!(a, lookup_digest(&[1u8; 32], &phrase));
        assert_ne!(a, lookup_digest(&[2u8; 32], &phrase));
        assert_eq!(a.len(), 64);
    }
}

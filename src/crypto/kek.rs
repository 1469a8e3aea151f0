use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::aes::{self, SecureKey, KEY_SIZE};
use crate::error::Result;

/// Label for the key that wraps content keys before they reach the vault.
pub const VAULT_WRAPPING_LABEL: &[u8] = b"exitlink/v1/key-vault-wrapping";
/// Label for the pepper mixed into recovery phrase lookups.
pub const PHRASE_LOOKUP_LABEL: &[u8] = b"exitlink/v1/phrase-lookup";

/// Derives a purpose-bound subkey from the master key.
pub fn derive_subkey(master_key: &[u8], label: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut hasher = Sha256::new();
    hasher.update((label.len() as u32).to_be_bytes());
    hasher.update(label);
    hasher.update(master_key);
    Zeroizing::new(hasher.finalize().into())
}

/// Key Encryption Key for content keys held in the vault.
///
/// The vault never stores a raw content key; a dump of the ephemeral store
/// alone does not decrypt anything.
#[derive(Clone)]
pub struct Kek {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Kek {
    /// Derives the vault KEK from the master key.
    pub fn from_master(master_key: &[u8]) -> Self {
        Self {
            key: derive_subkey(master_key, VAULT_WRAPPING_LABEL),
        }
    }

    /// Seals a content key.
    pub fn wrap(&self, content_key: &SecureKey) -> Result<Vec<u8>> {
        aes::seal(&self.key, content_key.as_bytes())
    }

    /// Opens a sealed content key.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SecureKey> {
        let raw = Zeroizing::new(aes::open(&self.key, wrapped)?);
        SecureKey::from_slice(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subkeys_are_bound_to_their_label() {
        let master = [9u8; 32];
        let a = derive_subkey(&master, VAULT_WRAPPING_LABEL);
        let b = derive_subkey(&master, PHRASE_LOOKUP_LABEL);
        assert_ne!(*a, *b);
        assert_eq!(*a, *derive_subkey(&master, VAULT_WRAPPING_LABEL));
    }

    #[test]
    fn wrapped_key_only_opens_under_same_master() {
        let content_key = aes::generate_key();
        let kek = Kek::from_master(&[1u8; 32]);
        let wrapped = kek.wrap(&content_key).unwrap();

        let unwrapped = kek.unwrap_key(&wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), content_key.as_bytes());

        assert!(Kek::from_master(&[2u8; 32]).unwrap_key(&wrapped).is_err());
    }
}

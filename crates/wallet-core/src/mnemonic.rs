use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::WalletError;

/// Word counts BIP-39 defines, with their entropy size in bytes.
const SUPPORTED_LENGTHS: [(usize, usize); 5] = [(12, 16), (15, 20), (18, 24), (21, 28), (24, 32)];

/// Generate a new BIP-39 mnemonic with the given number of words.
pub fn generate_mnemonic(word_count: usize) -> Result<String, WalletError> {
    let entropy_len = SUPPORTED_LENGTHS
        .iter()
        .find(|(words, _)| *words == word_count)
        .map(|(_, bytes)| *bytes)
        .ok_or_else(|| {
            WalletError::InvalidMnemonic(format!(
                "unsupported word count {word_count}, expected 12, 15, 18, 21 or 24"
            ))
        })?;

    let mut entropy = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut entropy[..entropy_len]);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(mnemonic?.to_string())
}

/// Check word list membership and the checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Derive the 64-byte seed from mnemonic + optional passphrase.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

    let mut seed = mnemonic.to_seed(passphrase);
    let out = Zeroizing::new(seed.to_vec());
    seed.zeroize();
    Ok(out)
}

/// Get the word list for autocomplete
pub fn word_list() -> &'static [&'static str] {
    Language::English.word_list()
}

/// Validate a single word against the BIP-39 word list
pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}

/// Mnemonic phrase wiped from memory on drop.
pub struct ZeroizingMnemonic {
    phrase: String,
}

impl ZeroizingMnemonic {
    pub fn new(phrase: String) -> Result<Self, WalletError> {
        if !validate_mnemonic(&phrase) {
            let mut phrase = phrase;
            phrase.zeroize();
            return Err(WalletError::InvalidMnemonic("Invalid mnemonic phrase".into()));
        }
        Ok(Self { phrase })
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn to_seed(&self, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, WalletError> {
        mnemonic_to_seed(&self.phrase, passphrase)
    }

    pub fn words(&self) -> Vec<&str> {
        self.phrase.split_whitespace().collect()
    }
}

impl Drop for ZeroizingMnemonic {
    fn drop(&mut self) {
        self.phrase.zeroize();
    }
}

impl std::fmt::Debug for ZeroizingMnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ZeroizingMnemonic({} words)", self.words().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_mnemonic_word_counts() {
        for count in [12, 15, 18, 21, 24] {
            let mnemonic = generate_mnemonic(count).unwrap();
            assert_eq!(mnemonic.split_whitespace().count(), count);
            assert!(validate_mnemonic(&mnemonic));
        }
    }

    #[test]
    fn test_generate_rejects_odd_word_count() {
        assert!(matches!(
            generate_mnemonic(13),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_generated_mnemonics_differ() {
        assert_ne!(generate_mnemonic(12).unwrap(), generate_mnemonic(12).unwrap());
    }

    #[test]
    fn test_validate_invalid_mnemonic() {
        assert!(!validate_mnemonic("invalid mnemonic phrase here"));
        // Valid words, bad checksum.
        assert!(!validate_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon"
        ));
    }

    #[test]
    fn test_mnemonic_to_seed_deterministic() {
        let seed1 = mnemonic_to_seed(ABANDON, "").unwrap();
        let seed2 = mnemonic_to_seed(ABANDON, "").unwrap();
        assert_eq!(*seed1, *seed2);
        assert_eq!(seed1.len(), 64);
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let seed_no_pass = mnemonic_to_seed(ABANDON, "").unwrap();
        let seed_with_pass = mnemonic_to_seed(ABANDON, "mypassphrase").unwrap();
        assert_ne!(*seed_no_pass, *seed_with_pass);
    }

    #[test]
    fn test_bip39_test_vector() {
        let seed = mnemonic_to_seed(ABANDON, "").unwrap();
        assert_eq!(
            hex::encode(&*seed),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_invalid_mnemonic_seed_error() {
        assert!(matches!(
            mnemonic_to_seed("not a real phrase", ""),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_is_valid_word() {
        assert!(is_valid_word("abandon"));
        assert!(is_valid_word("zoo"));
        assert!(!is_valid_word("notaword"));
        assert!(!is_valid_word(""));
        assert_eq!(word_list().len(), 2048);
    }

    #[test]
    fn test_zeroizing_mnemonic() {
        let zm = ZeroizingMnemonic::new(ABANDON.to_string()).unwrap();
        assert_eq!(zm.words().len(), 12);
        let seed = zm.to_seed("").unwrap();
        assert_eq!(seed.len(), 64);
        assert!(!format!("{zm:?}").contains("abandon"));
    }

    #[test]
    fn test_zeroizing_mnemonic_rejects_garbage() {
        assert!(ZeroizingMnemonic::new("hello world".into()).is_err());
    }
}

//! Fixed-length key and identifier types exchanged with the engine.
//!
//! All of them render as upper-case hex, which is how Tox clients display
//! and paste addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::surface::types::{
    ADDRESS_SIZE, FILE_ID_LENGTH, HASH_LENGTH, NOSPAM_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE,
};

/// Failure to parse a key from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("expected {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    Hex(String),
}

macro_rules! byte_key {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Copy a key out of a slice of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode_upper(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = KeyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.len() != $len * 2 {
                    return Err(KeyParseError::Length {
                        expected: $len * 2,
                        actual: s.len(),
                    });
                }
                let mut out = [0u8; $len];
                hex::decode_to_slice(s, &mut out).map_err(|e| KeyParseError::Hex(e.to_string()))?;
                Ok(Self(out))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

byte_key!(
    /// Long-term public key of a Tox identity.
    PublicKey,
    PUBLIC_KEY_SIZE
);

byte_key!(
    /// Long-term secret key. Its `Debug` output is the full key, so keep it out of logs.
    SecretKey,
    SECRET_KEY_SIZE
);

byte_key!(
    /// Friend address: public key, nospam and a two-byte checksum.
    Address,
    ADDRESS_SIZE
);

byte_key!(
    /// Identifier the engine assigns to a file transfer.
    FileId,
    FILE_ID_LENGTH
);

byte_key!(
    /// Output of the engine's hash function.
    Hash,
    HASH_LENGTH
);

/// The DHT key is a public key of its own.
pub type DhtId = PublicKey;

impl Address {
    /// Build an address from its parts, computing the checksum.
    pub fn new(public_key: &PublicKey, nospam: u32) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes[..PUBLIC_KEY_SIZE].copy_from_slice(&public_key.0);
        bytes[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE].copy_from_slice(&nospam.to_be_bytes());
        let checksum = Self::compute_checksum(&bytes[..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        bytes[PUBLIC_KEY_SIZE + NOSPAM_SIZE..].copy_from_slice(&checksum);
        Self(bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        let mut pk = [0u8; PUBLIC_KEY_SIZE];
        pk.copy_from_slice(&self.0[..PUBLIC_KEY_SIZE]);
        PublicKey(pk)
    }

    pub fn nospam(&self) -> u32 {
        let mut raw = [0u8; NOSPAM_SIZE];
        raw.copy_from_slice(&self.0[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        u32::from_be_bytes(raw)
    }

    pub fn checksum(&self) -> [u8; 2] {
        [self.0[ADDRESS_SIZE - 2], self.0[ADDRESS_SIZE - 1]]
    }

    /// Whether the trailing checksum matches the key and nospam.
    pub fn checksum_is_valid(&self) -> bool {
        Self::compute_checksum(&self.0[..PUBLIC_KEY_SIZE + NOSPAM_SIZE]) == self.checksum()
    }

    /// XOR of the payload taken two bytes at a time.
    fn compute_checksum(payload: &[u8]) -> [u8; 2] {
        let mut sum = [0u8; 2];
        for (i, byte) in payload.iter().enumerate() {
            sum[i % 2] ^= byte;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key(seed: u8) -> PublicKey {
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = seed.wrapping_mul(31).wrapping_add(i as u8);
        }
        PublicKey(bytes)
    }

    #[test]
    fn public_key_text_round_trip() {
        for seed in [0u8, 1, 7, 128, 255] {
            let key = sample_key(seed);
            let text = key.to_string();
            assert_eq!(text.len(), 64);
            assert_eq!(text, text.to_uppercase());
            assert_eq!(text.parse::<PublicKey>().unwrap(), key);
        }
    }

    #[test]
    fn address_text_round_trip_and_parts() {
        let key = sample_key(9);
        let address = Address::new(&key, 0xDEAD_BEEF);
        let text = address.to_string();
        assert_eq!(text.len(), 76);

        let parsed: Address = text.parse().unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.public_key(), key);
        assert_eq!(parsed.nospam(), 0xDEAD_BEEF);
        assert!(parsed.checksum_is_valid());
    }

    #[test]
    fn lower_case_input_is_accepted() {
        let key = sample_key(3);
        let lower = key.to_string().to_lowercase();
        assert_eq!(lower.parse::<PublicKey>().unwrap(), key);
    }

    #[test]
    fn tampered_address_fails_checksum() {
        let mut address = Address::new(&sample_key(4), 42);
        address.0[0] ^= 0x01;
        assert!(!address.checksum_is_valid());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = "ABCD".parse::<PublicKey>().unwrap_err();
        assert_eq!(
            err,
            KeyParseError::Length {
                expected: 64,
                actual: 4
            }
        );
    }

    #[test]
    fn non_hex_is_rejected() {
        let bad = "Z".repeat(64);
        assert!(matches!(bad.parse::<PublicKey>(), Err(KeyParseError::Hex(_))));
    }

    #[test]
    fn serializes_as_hex_string() {
        let key = sample_key(5);
        let json = serde_json::to_value(key).unwrap();
        assert_eq!(json, serde_json::Value::String(key.to_string()));
        let back: PublicKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }
}

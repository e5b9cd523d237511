//! Savedata format: a header line followed by a JSON profile.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

const MAGIC: &[u8] = b"toxbind-loopback\n";
/// Header of a passphrase-encrypted Tox save, which the loopback cannot open.
const ENCRYPTED_MAGIC: &[u8] = b"toxEsave";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SavedFriend {
    pub public_key: String,
    #[serde(default)]
    pub name: Vec<u8>,
    #[serde(default)]
    pub status_message: Vec<u8>,
    #[serde(default)]
    pub last_online: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Profile {
    pub secret_key: String,
    pub nospam: u32,
    #[serde(default)]
    pub name: Vec<u8>,
    #[serde(default)]
    pub status_message: Vec<u8>,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub friends: Vec<SavedFriend>,
}

#[derive(Debug)]
pub(crate) enum LoadFailure {
    Encrypted,
    BadFormat(anyhow::Error),
}

pub(crate) fn encode(profile: &Profile) -> anyhow::Result<Vec<u8>> {
    let mut out = MAGIC.to_vec();
    serde_json::to_writer(&mut out, profile).context("serialising profile")?;
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Profile, LoadFailure> {
    if bytes.starts_with(ENCRYPTED_MAGIC) {
        return Err(LoadFailure::Encrypted);
    }
    parse(bytes).map_err(LoadFailure::BadFormat)
}

fn parse(bytes: &[u8]) -> anyhow::Result<Profile> {
    let Some(body) = bytes.strip_prefix(MAGIC) else {
        bail!("missing savedata header");
    };
    let profile: Profile = serde_json::from_slice(body).context("parsing profile")?;
    parse_key(&profile.secret_key).context("profile secret key")?;
    for friend in &profile.friends {
        parse_key(&friend.public_key).context("friend public key")?;
    }
    Ok(profile)
}

pub(crate) fn parse_key(text: &str) -> anyhow::Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(text, &mut out).with_context(|| format!("invalid key `{text}`"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            secret_key: hex::encode([3u8; 32]),
            nospam: 0xDEADBEEF,
            name: b"alice".to_vec(),
            status_message: Vec::new(),
            status: 1,
            friends: vec![SavedFriend {
                public_key: hex::encode([9u8; 32]),
                name: b"bob".to_vec(),
                status_message: Vec::new(),
                last_online: 1_700_000_000,
            }],
        }
    }

    #[test]
    fn encoded_profile_decodes() {
        let bytes = encode(&profile()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), profile());
    }

    #[test]
    fn encrypted_saves_are_recognised() {
        assert!(matches!(decode(b"toxEsave\x00\x01"), Err(LoadFailure::Encrypted)));
    }

    #[test]
    fn garbage_is_bad_format() {
        assert!(matches!(decode(b"not a save"), Err(LoadFailure::BadFormat(_))));
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(br#"{"secret_key":"zz","nospam":1}"#);
        assert!(matches!(decode(&bytes), Err(LoadFailure::BadFormat(_))));
    }
}

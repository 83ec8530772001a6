//! Keystore: the four secret keys and the version counter, persisted as a
//! single password-encrypted file.
//!
//! On-disk layout (little-endian): `salt(16) ‖ mac(16) ‖ nonce(24) ‖
//! ct(4·λ + 8)`. The AEAD associated data is the salt; the plaintext is
//! `Kd ‖ Kg ‖ Kt ‖ Kf ‖ Con`. `Con` is not secret and survives `wipe()`.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::info;
use zeroize::Zeroize;

use dsse_core::bytes::{self, Secret};
use dsse_core::crypto;
use dsse_core::error::{Error, Result};
use dsse_core::{LAMBDA, MAC_LEN, NONCE_LEN, SALT_LEN};

const FILE_LEN: usize = SALT_LEN + MAC_LEN + NONCE_LEN + 4 * LAMBDA + 8;

#[derive(Debug)]
pub struct Keystore {
    /// Document encryption key.
    pub kd: Secret<LAMBDA>,
    /// Per-entry subkey derivation key.
    pub kg: Secret<LAMBDA>,
    /// Trapdoor key.
    pub kt: Secret<LAMBDA>,
    /// Keyword transform key.
    pub kf: Secret<LAMBDA>,
    /// Version counter. Starts at `0xFF…FF`, decremented once per `add`.
    pub con: u64,
}

impl Keystore {
    /// Four fresh random keys and the initial counter.
    pub fn create() -> Self {
        let mut ks = Self {
            kd: Secret::zeroed(),
            kg: Secret::zeroed(),
            kt: Secret::zeroed(),
            kf: Secret::zeroed(),
            con: u64::MAX,
        };
        ks.kd.randomize();
        ks.kg.randomize();
        ks.kt.randomize();
        ks.kf.randomize();
        ks
    }

    pub fn load(path: &Path, password: &[u8]) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::KeysNotFound),
            Err(e) => return Err(e.into()),
        };
        if data.len() != FILE_LEN {
            return Err(Error::CorruptedKeys);
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (mac, rest) = rest.split_at(MAC_LEN);
        let (nonce, ct) = rest.split_at(NONCE_LEN);

        let salt: [u8; SALT_LEN] = salt.try_into().expect("split width");
        let mac: [u8; MAC_LEN] = mac.try_into().expect("split width");
        let nonce: [u8; NONCE_LEN] = nonce.try_into().expect("split width");

        let key = crypto::kdf(password, &salt);
        let mut plain = ct.to_vec();
        let ok = crypto::open_in_place(key.as_bytes(), &nonce, &mac, &salt, &mut plain);
        drop(key);
        if ok.is_err() {
            plain.zeroize();
            return Err(Error::CorruptedKeys);
        }

        let ks = Self {
            kd: Secret::from_slice(&plain[..LAMBDA]),
            kg: Secret::from_slice(&plain[LAMBDA..2 * LAMBDA]),
            kt: Secret::from_slice(&plain[2 * LAMBDA..3 * LAMBDA]),
            kf: Secret::from_slice(&plain[3 * LAMBDA..4 * LAMBDA]),
            con: bytes::read_u64_le(&plain[4 * LAMBDA..]),
        };
        plain.zeroize();
        Ok(ks)
    }

    /// Load the keystore, or create and persist a fresh one if the file
    /// does not exist yet. Returns whether a new keystore was set up.
    pub fn load_or_setup(path: &Path, password: &[u8]) -> Result<(Self, bool)> {
        match Self::load(path, password) {
            Ok(ks) => Ok((ks, false)),
            Err(Error::KeysNotFound) => {
                info!("key file not found, setting up a fresh keystore");
                let ks = Self::create();
                ks.store(path, password)?;
                Ok((ks, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Atomic replace: write `<path>.tmp` with 0600 permissions, then
    /// rename over the target.
    pub fn store(&self, path: &Path, password: &[u8]) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        bytes::fill_random(&mut salt);
        bytes::fill_random(&mut nonce);

        let mut plain = Vec::with_capacity(4 * LAMBDA + 8);
        plain.extend_from_slice(self.kd.as_ref());
        plain.extend_from_slice(self.kg.as_ref());
        plain.extend_from_slice(self.kt.as_ref());
        plain.extend_from_slice(self.kf.as_ref());
        plain.extend_from_slice(&self.con.to_le_bytes());

        let key = crypto::kdf(password, &salt);
        let mac = crypto::seal_in_place(key.as_bytes(), &nonce, &salt, &mut plain);
        drop(key);

        let mut file_data = Vec::with_capacity(FILE_LEN);
        file_data.extend_from_slice(&salt);
        file_data.extend_from_slice(&mac);
        file_data.extend_from_slice(&nonce);
        file_data.extend_from_slice(&plain);
        plain.zeroize();

        let tmp = path.with_extension("enc.tmp");
        fs::write(&tmp, &file_data)?;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Re-encrypt the key file under a new password. The keys themselves
    /// (and the counter) are untouched; the loaded copy wipes on drop.
    pub fn change_password(path: &Path, old: &[u8], new: &[u8]) -> Result<()> {
        let ks = Self::load(path, old)?;
        ks.store(path, new)
    }

    /// Zero the four key buffers. `con` is not secret and is preserved.
    pub fn wipe(&mut self) {
        self.kd.wipe();
        self.kg.wipe();
        self.kt.wipe();
        self.kf.wipe();
    }

    /// Probe for the key-wipe invariant tests.
    #[cfg(any(test, feature = "test-probe"))]
    pub fn secrets_are_zero(&self) -> bool {
        self.kd.is_zero() && self.kg.is_zero() && self.kt.is_zero() && self.kf.is_zero()
    }
}

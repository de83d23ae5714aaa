// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of TideMap.
//
// TideMap is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// TideMap is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with TideMap. If not, see <https://www.gnu.org/licenses/>.

//! Value encryption for the LSM engine.
//!
//! ## Purpose
//! Encrypts values at rest with AES-GCM using a two level key scheme:
//!
//! - A caller-supplied **master key** (16, 24 or 32 bytes) only wraps data keys
//! - Random 256-bit **data keys** encrypt values and are rotated on a fixed interval
//!
//! Wrapped data keys live in a dedicated keyring tree so that values written
//! under any earlier data key stay readable after rotation.
//!
//! ## Formats
//!
//! - Keyring record: `[created_at u64 BE][12-byte nonce][wrapped key + 16-byte tag]`
//! - Encrypted value: `[key id u32 BE][12-byte nonce][ciphertext + 16-byte tag]`

use crate::{StorageError, StorageResult};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_LEN: usize = 12;
const KEY_ID_LEN: usize = 4;
const TIMESTAMP_LEN: usize = 8;

/// Name of the tree holding wrapped data keys.
pub(crate) const KEYRING_TREE: &str = "__tidemap_keyring";

/// Cipher derived from the master key, used only to wrap data keys.
enum MasterCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl MasterCipher {
    fn new(key: &[u8]) -> StorageResult<Self> {
        let invalid = |_| StorageError::InvalidEncryptionKey(key.len());
        match key.len() {
            16 => Ok(Self::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?)),
            24 => Ok(Self::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?)),
            32 => Ok(Self::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?)),
            n => Err(StorageError::InvalidEncryptionKey(n)),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        match self {
            Self::Aes128(cipher) => seal(cipher, plaintext),
            Self::Aes192(cipher) => seal(cipher, plaintext),
            Self::Aes256(cipher) => seal(cipher, plaintext),
        }
    }

    fn open(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        match self {
            Self::Aes128(cipher) => open(cipher, data),
            Self::Aes192(cipher) => open(cipher, data),
            Self::Aes256(cipher) => open(cipher, data),
        }
    }
}

/// Encrypts with a fresh random nonce and prepends it to the ciphertext.
fn seal<C>(cipher: &C, plaintext: &[u8]) -> StorageResult<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StorageError::CipherError(format!("AES encryption failed: {}", e)))?;
    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn open<C>(cipher: &C, data: &[u8]) -> StorageResult<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    if data.len() < NONCE_LEN {
        return Err(StorageError::CipherError(
            "Encrypted data too short (missing nonce)".to_string(),
        ));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|e| {
            StorageError::CipherError(format!(
                "AES decryption failed (wrong key or tampered data): {}",
                e
            ))
        })
}

struct Keyring {
    keys: HashMap<u32, Aes256Gcm>,
    active: u32,
    created_at: u64,
}

/// Encrypts and decrypts LSM values with rotating data keys.
pub(crate) struct ValueCipher {
    master: MasterCipher,
    tree: sled::Tree,
    rotation: Duration,
    keyring: RwLock<Keyring>,
}

impl ValueCipher {
    /// Loads the keyring from `tree`, creating the first data key if it is empty.
    ///
    /// Fails if the master key has the wrong length or cannot unwrap the
    /// stored data keys.
    pub(crate) fn open(
        master_key: &[u8],
        tree: sled::Tree,
        rotation: Duration,
    ) -> StorageResult<Self> {
        let master = MasterCipher::new(master_key)?;

        let mut keys = HashMap::new();
        let mut active = None;
        for record in tree.iter() {
            let (id, record) = record?;
            let id = parse_key_id(&id)?;
            if record.len() < TIMESTAMP_LEN {
                return Err(StorageError::CipherError(format!("Corrupt keyring record {}", id)));
            }
            let (created, wrapped) = record.split_at(TIMESTAMP_LEN);
            let raw = master.open(wrapped)?;
            let cipher = Aes256Gcm::new_from_slice(&raw)
                .map_err(|_| StorageError::CipherError(format!("Corrupt data key {}", id)))?;
            keys.insert(id, cipher);
            let created_at = u64::from_be_bytes(created.try_into().unwrap_or_default());
            if active.map_or(true, |(current, _)| id > current) {
                active = Some((id, created_at));
            }
        }

        let value_cipher = Self {
            master,
            tree,
            rotation,
            keyring: RwLock::new(Keyring {
                keys,
                active: 0,
                created_at: 0,
            }),
        };

        match active {
            Some((id, created_at)) => {
                let mut keyring = value_cipher.write_keyring();
                keyring.active = id;
                keyring.created_at = created_at;
                debug!(data_keys = keyring.keys.len(), active = id, "Loaded LSM keyring");
            }
            None => {
                let mut keyring = value_cipher.write_keyring();
                value_cipher.rotate(&mut keyring)?;
            }
        }
        Ok(value_cipher)
    }

    /// Encrypts `plaintext` under the active data key, rotating it first if stale.
    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        {
            let keyring = self.read_keyring();
            if !self.is_stale(&keyring) {
                return encrypt_with(&keyring, plaintext);
            }
        }
        let mut keyring = self.write_keyring();
        if self.is_stale(&keyring) {
            self.rotate(&mut keyring)?;
        }
        encrypt_with(&keyring, plaintext)
    }

    /// Decrypts a value written by [`ValueCipher::encrypt`] under any known data key.
    pub(crate) fn decrypt(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        if data.len() < KEY_ID_LEN {
            return Err(StorageError::CipherError(
                "Encrypted value too short (missing key id)".to_string(),
            ));
        }
        let (id, sealed) = data.split_at(KEY_ID_LEN);
        let id = parse_key_id(id)?;
        let keyring = self.read_keyring();
        let cipher = keyring
            .keys
            .get(&id)
            .ok_or_else(|| StorageError::CipherError(format!("Unknown data key {}", id)))?;
        open(cipher, sealed)
    }

    /// Rotates the data key if it is older than the rotation interval.
    pub(crate) fn rotate_if_stale(&self) -> StorageResult<()> {
        let mut keyring = self.write_keyring();
        if self.is_stale(&keyring) {
            self.rotate(&mut keyring)?;
        }
        Ok(())
    }

    fn is_stale(&self, keyring: &Keyring) -> bool {
        now_secs().saturating_sub(keyring.created_at) >= self.rotation.as_secs()
    }

    fn rotate(&self, keyring: &mut Keyring) -> StorageResult<()> {
        let raw = Aes256Gcm::generate_key(&mut OsRng);
        let id = keyring.keys.keys().max().map_or(1, |max| max + 1);
        let created_at = now_secs();

        let mut record = created_at.to_be_bytes().to_vec();
        record.extend_from_slice(&self.master.seal(raw.as_slice())?);
        self.tree.insert(id.to_be_bytes(), record)?;
        self.tree.flush()?;

        keyring.keys.insert(id, Aes256Gcm::new(&raw));
        keyring.active = id;
        keyring.created_at = created_at;
        info!(data_key = id, "Rotated LSM data key");
        Ok(())
    }

    fn read_keyring(&self) -> std::sync::RwLockReadGuard<'_, Keyring> {
        self.keyring.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_keyring(&self) -> std::sync::RwLockWriteGuard<'_, Keyring> {
        self.keyring.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encrypt_with(keyring: &Keyring, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
    let cipher = keyring.keys.get(&keyring.active).ok_or_else(|| {
        StorageError::CipherError(format!("Active data key {} missing", keyring.active))
    })?;
    let mut result = keyring.active.to_be_bytes().to_vec();
    result.extend_from_slice(&seal(cipher, plaintext)?);
    Ok(result)
}

fn parse_key_id(bytes: &[u8]) -> StorageResult<u32> {
    let id: [u8; KEY_ID_LEN] = bytes
        .try_into()
        .map_err(|_| StorageError::CipherError("Malformed data key id".to_string()))?;
    Ok(u32::from_be_bytes(id))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

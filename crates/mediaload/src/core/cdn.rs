use std::collections::BTreeMap;

use bytes::Bytes;
use mediaload_verify::{Sha256Hasher, verify_digest};

use crate::data::{CdnCipher, CdnRedirect, DcId, FileHash};

const CDN_KEY_LEN: usize = 32;
const CDN_IV_LEN: usize = 16;

/// Result of checking CDN bytes against the hash catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CdnHashCheck {
    /// Some part of the chunk is not covered by the catalog yet.
    NoHash,
    Invalid,
    Good,
}

/// Where a remote-storage loader fetches from after a CDN redirect, with
/// the hashes its bytes are verified against.
#[derive(Debug, Clone)]
pub(crate) struct CdnState {
    pub dc_id: DcId,
    pub token: Bytes,
    cipher:    CdnCipher,
    hashes:    BTreeMap<u64, FileHash>,
}

impl CdnState {
    /// `None` when the redirect carries a malformed key or IV.
    pub fn from_redirect(redirect: CdnRedirect) -> Option<Self> {
        if redirect.encryption_key.len() != CDN_KEY_LEN || redirect.encryption_iv.len() != CDN_IV_LEN
        {
            return None;
        }
        let mut state = Self {
            dc_id:  redirect.dc_id,
            token:  redirect.token,
            cipher: CdnCipher {
                key: redirect.encryption_key,
                iv:  redirect.encryption_iv,
            },
            hashes: BTreeMap::new(),
        };
        state.add_hashes(redirect.hashes);
        Some(state)
    }

    pub fn same_params(&self, redirect: &CdnRedirect) -> bool {
        self.dc_id == redirect.dc_id
            && self.token == redirect.token
            && self.cipher.key == redirect.encryption_key
            && self.cipher.iv == redirect.encryption_iv
    }

    pub fn cipher(&self) -> &CdnCipher { &self.cipher }

    pub fn add_hashes(&mut self, hashes: impl IntoIterator<Item = FileHash>) {
        for hash in hashes {
            self.hashes.insert(hash.offset, hash);
        }
    }

    /// Drop catalog entries covering `offset..offset + len`.
    pub fn forget(&mut self, offset: u64, len: u64) {
        let end = offset.saturating_add(len.max(1));
        let stale: Vec<u64> = self.hashes.range(offset..end).map(|(key, _)| *key).collect();
        for key in stale {
            self.hashes.remove(&key);
        }
    }

    /// Verify `bytes` fetched at `offset`. A chunk may span several catalog
    /// entries; every one of them must be present and match.
    pub fn check(&self, offset: u64, bytes: &[u8]) -> CdnHashCheck {
        let mut position = 0usize;
        while position < bytes.len() {
            let Some(hash) = self.hashes.get(&(offset + position as u64)) else {
                return CdnHashCheck::NoHash;
            };
            let limit = hash.limit as usize;
            if limit == 0 || limit > bytes.len() - position {
                return CdnHashCheck::Invalid;
            }
            let piece = &bytes[position..position + limit];
            if verify_digest::<Sha256Hasher>(&hash.hash, piece).is_err() {
                return CdnHashCheck::Invalid;
            }
            position += limit;
        }
        CdnHashCheck::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(offset: u64, data: &[u8]) -> FileHash {
        FileHash {
            offset,
            limit: data.len() as u32,
            hash: Bytes::from(Sha256Hasher::digest(data)),
        }
    }

    fn redirect(hashes: Vec<FileHash>) -> CdnRedirect {
        CdnRedirect {
            dc_id: 203,
            token: Bytes::from_static(b"token"),
            encryption_key: Bytes::from(vec![7; CDN_KEY_LEN]),
            encryption_iv: Bytes::from(vec![9; CDN_IV_LEN]),
            hashes,
        }
    }

    #[test]
    fn test_rejects_malformed_params() {
        let mut bad = redirect(Vec::new());
        bad.encryption_iv = Bytes::from_static(b"short");
        assert!(CdnState::from_redirect(bad).is_none());

        let good = redirect(Vec::new());
        let state = CdnState::from_redirect(good.clone()).unwrap();
        assert!(state.same_params(&good));

        let mut moved = good;
        moved.dc_id = 204;
        assert!(!state.same_params(&moved));
    }

    #[test]
    fn test_check_single_entry() {
        let state = CdnState::from_redirect(redirect(vec![hash(2000, b"abcd")])).unwrap();
        assert_eq!(state.check(2000, b"abcd"), CdnHashCheck::Good);
        assert_eq!(state.check(2000, b"abce"), CdnHashCheck::Invalid);
        assert_eq!(state.check(3000, b"abcd"), CdnHashCheck::NoHash);
    }

    #[test]
    fn test_check_spanning_entries() {
        let mut state =
            CdnState::from_redirect(redirect(vec![hash(0, b"ab"), hash(2, b"cd")])).unwrap();
        assert_eq!(state.check(0, b"abcd"), CdnHashCheck::Good);
        assert_eq!(state.check(0, b"abcde"), CdnHashCheck::NoHash);

        state.forget(0, 4);
        assert_eq!(state.check(0, b"ab"), CdnHashCheck::NoHash);
        assert_eq!(state.check(2, b"cd"), CdnHashCheck::NoHash);
        state.add_hashes(vec![hash(0, b"abcd")]);
        assert_eq!(state.check(0, b"abcd"), CdnHashCheck::Good);
    }

    #[test]
    fn test_entry_longer_than_chunk_is_invalid() {
        let state = CdnState::from_redirect(redirect(vec![hash(0, b"abcdef")])).unwrap();
        assert_eq!(state.check(0, b"abc"), CdnHashCheck::Invalid);
    }
}

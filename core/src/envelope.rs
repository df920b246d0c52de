/*
 * envelope.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Pad -> encrypt (AES-256-CBC) -> base64 envelope around every stored payload, and the
//! inverse on read. Key derivation is PBKDF2-HMAC-SHA256 with a fixed salt, matching the
//! original implementation's on-disk format byte for byte.
//!
//! bzip2 helpers are exposed for API parity with the original codec but are not invoked
//! anywhere on the persistence path: stored bodies are ciphertext, not compressed ciphertext.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::io;

const AES_BLOCK_SIZE: usize = 16;
const AES_KEY_SIZE: usize = 32;
const PBKDF2_SALT: &str = "just a random salt";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Stateful codec bound to a passphrase and iteration count.
#[derive(Clone)]
pub struct EnvelopeCodec {
    key: [u8; AES_KEY_SIZE],
}

impl EnvelopeCodec {
    /// Derive the AES key from `passphrase` via PBKDF2-HMAC-SHA256 with the fixed salt.
    pub fn new(passphrase: &str, rounds: u32) -> Self {
        let mut key = [0u8; AES_KEY_SIZE];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), PBKDF2_SALT.as_bytes(), rounds, &mut key);
        EnvelopeCodec { key }
    }

    /// PKCS#7-style pad: append `n` copies of byte `n`, `n` in `[1, 16]`, the smallest
    /// value making `len(data) + n` a multiple of the AES block size. Always appends at
    /// least one byte, matching the original's `pad` exactly.
    fn pad(data: &[u8]) -> Vec<u8> {
        let pad_len = AES_BLOCK_SIZE - (data.len() % AES_BLOCK_SIZE);
        let mut out = Vec::with_capacity(data.len() + pad_len);
        out.extend_from_slice(data);
        out.resize(data.len() + pad_len, pad_len as u8);
        out
    }

    /// Strip the padding appended by `pad`. The final byte's value is the pad length.
    fn unpad(data: &[u8]) -> io::Result<Vec<u8>> {
        let pad_len = *data
            .last()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty plaintext"))? as usize;
        if pad_len == 0 || pad_len > AES_BLOCK_SIZE || pad_len > data.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad padding"));
        }
        Ok(data[..data.len() - pad_len].to_vec())
    }

    /// AES-256-CBC encrypt with a fresh random IV, return `iv || ciphertext`.
    fn encrypt(&self, padded: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let mut buf = padded.to_vec();
        let enc = Aes256CbcEnc::new(&self.key.into(), &iv.into());
        let n = buf.len();
        let ct = enc
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, n)
            .expect("plaintext is already block-aligned");
        let mut out = Vec::with_capacity(AES_BLOCK_SIZE + ct.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(ct);
        out
    }

    /// Inverse of `encrypt`: split IV from ciphertext, decrypt.
    fn decrypt(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        if data.len() < AES_BLOCK_SIZE || (data.len() - AES_BLOCK_SIZE) % AES_BLOCK_SIZE != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "ciphertext not block-aligned"));
        }
        let (iv, ciphertext) = data.split_at(AES_BLOCK_SIZE);
        let mut buf = ciphertext.to_vec();
        let dec = Aes256CbcDec::new(&self.key.into(), iv.into());
        let pt = dec
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "decrypt failed"))?;
        Ok(pt.to_vec())
    }

    /// Encode `plaintext` as `base64(iv || AES-256-CBC(key, iv, pad(plaintext)))`.
    pub fn encrypt_message(&self, plaintext: &[u8]) -> String {
        let padded = Self::pad(plaintext);
        let wrapped = self.encrypt(&padded);
        BASE64.encode(wrapped)
    }

    /// Inverse of `encrypt_message`. Returns an error if the base64 is malformed or the
    /// ciphertext does not decrypt to a validly-padded block (i.e. wrong key).
    pub fn decrypt_message(&self, encoded: &str) -> io::Result<Vec<u8>> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let padded = self.decrypt(&raw)?;
        Self::unpad(&padded)
    }

    /// bzip2-compress `data`. Exposed for parity with the original codec; unused by the
    /// persistence path.
    pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        use std::io::Write;
        let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data)?;
        encoder.finish()
    }

    /// bzip2-decompress `data`. Exposed for parity with the original codec; unused by the
    /// persistence path.
    pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        use bzip2::read::BzDecoder;
        use std::io::Read;
        let mut decoder = BzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_various_lengths() {
        let codec = EnvelopeCodec::new("correct horse battery staple", 1000);
        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 1000, 9999] {
            let data = vec![0x5au8; len];
            let encoded = codec.encrypt_message(&data);
            let decoded = codec.decrypt_message(&encoded).unwrap();
            assert_eq!(decoded, data, "roundtrip failed for len {}", len);
        }
    }

    #[test]
    fn pad_always_appends_between_one_and_block_size_bytes() {
        for len in 0..40usize {
            let data = vec![0u8; len];
            let padded = EnvelopeCodec::pad(&data);
            let added = padded.len() - len;
            assert!((1..=AES_BLOCK_SIZE).contains(&added));
            assert_eq!(padded.len() % AES_BLOCK_SIZE, 0);
            assert_eq!(*padded.last().unwrap() as usize, added);
        }
    }

    #[test]
    fn wrong_key_does_not_decode_to_well_formed_body() {
        let codec_a = EnvelopeCodec::new("key-a", 1000);
        let codec_b = EnvelopeCodec::new("key-b", 1000);
        let encoded = codec_a.encrypt_message(b"d\r\nsome directory body");
        match codec_b.decrypt_message(&encoded) {
            Err(_) => {}
            Ok(bytes) => assert_ne!(&bytes[..3.min(bytes.len())], b"d\r\n"),
        }
    }

    #[test]
    fn bzip2_helpers_roundtrip() {
        let data = b"some data to compress, repeated ".repeat(50);
        let compressed = EnvelopeCodec::compress(&data).unwrap();
        let decompressed = EnvelopeCodec::decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn key_derivation_is_deterministic_and_salt_is_fixed() {
        let a = EnvelopeCodec::new("pw", 500);
        let b = EnvelopeCodec::new("pw", 500);
        assert_eq!(a.key, b.key);
    }
}

// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! VNC Authentication (spec §4.B): DES-ECB challenge-response under a
//! password-derived key, using the VNC wire convention of bit-reversing
//! each key byte before it is used.

use cipher::{BlockEncrypt, KeyInit};
use des::Des;

/// Derives the 8-byte DES key from a password: truncate or NUL-pad to
/// exactly 8 bytes, then reverse the bit order within each byte (LSB ↔
/// MSB). This reversal is the VNC wire convention, not a general DES
/// property — RFB keys are deliberately "backwards" DES keys.
#[must_use]
pub fn derive_des_key(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    let bytes = password.as_bytes();
    let n = bytes.len().min(8);
    key[..n].copy_from_slice(&bytes[..n]);
    for byte in &mut key {
        *byte = byte.reverse_bits();
    }
    key
}

/// Encrypts a 16-byte challenge as two independent 8-byte DES-ECB blocks
/// under the password-derived key.
///
/// A password of length 0 derives an all-zero key (spec §8 boundary case);
/// `derive_des_key` handles that uniformly since `reverse_bits()` of zero
/// is zero.
#[must_use]
pub fn encrypt_challenge(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    let key = derive_des_key(password);
    let cipher = Des::new_from_slice(&key).expect("DES key is always exactly 8 bytes");

    let mut response = [0u8; 16];
    for (chunk_in, chunk_out) in challenge.chunks_exact(8).zip(response.chunks_exact_mut(8)) {
        let mut block = cipher::generic_array::GenericArray::clone_from_slice(chunk_in);
        cipher.encrypt_block(&mut block);
        chunk_out.copy_from_slice(&block);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_derives_all_zero_key() {
        assert_eq!(derive_des_key(""), [0u8; 8]);
    }

    #[test]
    fn long_password_is_truncated_to_eight_bytes() {
        let short = derive_des_key("password");
        let long = derive_des_key("passwordXXXXXX");
        assert_eq!(short, long);
    }

    #[test]
    fn encrypt_challenge_is_deterministic() {
        let challenge = [0u8; 16];
        let a = encrypt_challenge("pass", &challenge);
        let b = encrypt_challenge("pass", &challenge);
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_yield_different_responses() {
        let challenge = [1u8; 16];
        let a = encrypt_challenge("pass", &challenge);
        let b = encrypt_challenge("word", &challenge);
        assert_ne!(a, b);
    }
}

// Copyright 2026 Veilnet Developers.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Blinded recipient keys.
//!
//! A cloak is a random blinder followed by a truncated hash of the blinder and a public key.
//! Relays on the path see a different cloak for every message, while the holder of the key can
//! still recognise it by recomputing the hash with the blinder from the wire.

use super::{crypto::hash, PubBytes, PUB_SIZE};
use arrayref::array_refs;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

pub const BLINDER_SIZE: usize = 3;
const TRUNCATED_HASH_SIZE: usize = 5;
pub const CLOAK_SIZE: usize = BLINDER_SIZE + TRUNCATED_HASH_SIZE;

pub type Blinder = [u8; BLINDER_SIZE];
pub type Cloak = [u8; CLOAK_SIZE];

/// Cloak `key` under a fresh random blinder.
pub fn cloak<R: RngCore + CryptoRng>(key: &PubBytes, rng: &mut R) -> Cloak {
	let mut blinder = Blinder::default();
	rng.fill_bytes(&mut blinder);
	cloak_with(&blinder, key)
}

pub fn cloak_with(blinder: &Blinder, key: &PubBytes) -> Cloak {
	let mut preimage = [0; BLINDER_SIZE + PUB_SIZE];
	preimage[..BLINDER_SIZE].copy_from_slice(blinder);
	preimage[BLINDER_SIZE..].copy_from_slice(key);
	let digest = hash(&preimage);
	let mut out = Cloak::default();
	out[..BLINDER_SIZE].copy_from_slice(blinder);
	out[BLINDER_SIZE..].copy_from_slice(&digest[..TRUNCATED_HASH_SIZE]);
	out
}

/// Whether `cloak` was produced from `key`.
pub fn matches(cloak: &Cloak, key: &PubBytes) -> bool {
	let (blinder, _) = array_refs![cloak, BLINDER_SIZE, TRUNCATED_HASH_SIZE];
	cloak_with(blinder, key).ct_eq(cloak).into()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::crypto::KeySet;

	#[test]
	fn matches_own_key_only() {
		let mut keys = KeySet::from_seed(7);
		let key = keys.key().public().to_bytes();
		let other = keys.key().public().to_bytes();
		for _ in 0..64 {
			let c = cloak(&key, &mut rand::rngs::OsRng);
			assert!(matches(&c, &key));
			assert!(!matches(&c, &other));
		}
		let blinder: Blinder = [9, 1, 2];
		assert_eq!(cloak_with(&blinder, &key)[..BLINDER_SIZE], blinder);
	}

	#[test]
	fn single_bit_corruption_never_matches() {
		let mut keys = KeySet::from_seed(8);
		let key = keys.key().public().to_bytes();
		let c = cloak(&key, &mut rand::rngs::OsRng);
		for bit in 0..CLOAK_SIZE * 8 {
			let mut corrupted = c;
			corrupted[bit / 8] ^= 1 << (bit % 8);
			assert!(!matches(&corrupted, &key), "bit {bit} flip still matched");
		}
	}
}

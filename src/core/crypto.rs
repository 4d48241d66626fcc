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

//! Key types and symmetric primitives.
//!
//! Keys are secp256k1. A shared cipher between two parties is the SHA-256 of the x coordinate of
//! their ECDH point, used as an AES-256-CTR key with a per-message IV as the initial counter block.

use super::{Error, Hash, Id, Iv, PubBytes, SigBytes, PRV_SIZE, PUB_SIZE, SIG_SIZE};
use aes::cipher::{KeyIvInit, StreamCipher};
use k256::{
	ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
	elliptic_curve::sec1::ToEncodedPoint,
	PublicKey, SecretKey,
};
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> Hash {
	Sha256::digest(data).into()
}

/// XOR `data` with the keystream of `cipher` starting at counter block `iv`. Applying it twice
/// restores the input.
pub fn encipher(cipher: &Hash, iv: &Iv, data: &mut [u8]) {
	let mut stream = Aes256Ctr::new(cipher.into(), iv.into());
	stream.apply_keystream(data);
}

/// Private key. Boxed so the secret is not copied around when the owner moves, and wiped on drop.
#[derive(Clone)]
pub struct PrvKey(Box<SecretKey>);

impl PrvKey {
	pub fn gen<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
		Self(Box::new(SecretKey::random(rng)))
	}

	pub fn from_bytes(bytes: &[u8; PRV_SIZE]) -> Result<Self, Error> {
		SecretKey::from_slice(bytes)
			.map(|key| Self(Box::new(key)))
			.map_err(|_| Error::InvalidPrivateKey)
	}

	pub fn to_bytes(&self) -> Zeroizing<[u8; PRV_SIZE]> {
		Zeroizing::new(self.0.to_bytes().into())
	}

	pub fn public(&self) -> PubKey {
		PubKey(self.0.public_key())
	}

	/// Shared cipher with the holder of the private half of `their`.
	pub fn cipher(&self, their: &PubKey) -> Hash {
		let shared = k256::ecdh::diffie_hellman(self.0.to_nonzero_scalar(), their.0.as_affine());
		hash(shared.raw_secret_bytes())
	}

	/// Recoverable signature over a 32-byte prehash.
	pub fn sign(&self, prehash: &Hash) -> Result<SigBytes, Error> {
		let key = SigningKey::from(&*self.0);
		let (signature, recovery) =
			key.sign_prehash_recoverable(prehash).map_err(|_| Error::InvalidSignature)?;
		let mut out = [0; SIG_SIZE];
		out[..SIG_SIZE - 1].copy_from_slice(&signature.to_bytes());
		out[SIG_SIZE - 1] = recovery.to_byte();
		Ok(out)
	}
}

impl PartialEq for PrvKey {
	fn eq(&self, other: &Self) -> bool {
		let (ours, theirs) = (self.to_bytes(), other.to_bytes());
		ours[..].ct_eq(&theirs[..]).into()
	}
}

impl Eq for PrvKey {}

impl std::fmt::Debug for PrvKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("PrvKey").field(&self.public()).finish()
	}
}

/// Public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PubKey(PublicKey);

impl PubKey {
	pub fn from_bytes(bytes: &PubBytes) -> Result<Self, Error> {
		PublicKey::from_sec1_bytes(bytes).map(Self).map_err(|_| Error::InvalidPublicKey)
	}

	/// Compressed SEC1 encoding.
	pub fn to_bytes(&self) -> PubBytes {
		let point = self.0.to_encoded_point(true);
		let mut out = [0; PUB_SIZE];
		out.copy_from_slice(point.as_bytes());
		out
	}
}

impl std::fmt::Debug for PubKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "PubKey({:x?})", &self.to_bytes()[..8])
	}
}

/// Recover the public key that produced `sig` over `prehash`.
pub fn recover(sig: &SigBytes, prehash: &Hash) -> Result<PubKey, Error> {
	let signature =
		Signature::from_slice(&sig[..SIG_SIZE - 1]).map_err(|_| Error::InvalidSignature)?;
	let recovery = RecoveryId::from_byte(sig[SIG_SIZE - 1]).ok_or(Error::InvalidSignature)?;
	let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery)
		.map_err(|_| Error::InvalidSignature)?;
	Ok(PubKey(PublicKey::from(&key)))
}

/// Source of ephemeral keys, IVs and identifiers for onion construction.
pub struct KeySet {
	rng: StdRng,
}

impl KeySet {
	pub fn new() -> Self {
		Self { rng: StdRng::from_entropy() }
	}

	/// Deterministic key set, for tests.
	pub fn from_seed(seed: u64) -> Self {
		Self { rng: StdRng::seed_from_u64(seed) }
	}

	pub fn key(&mut self) -> PrvKey {
		PrvKey::gen(&mut self.rng)
	}

	pub fn iv(&mut self) -> Iv {
		let mut iv = Iv::default();
		self.rng.fill_bytes(&mut iv);
		iv
	}

	pub fn id(&mut self) -> Id {
		let mut id = Id::default();
		self.rng.fill_bytes(&mut id);
		id
	}
}

impl Default for KeySet {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ecdh_is_symmetric() {
		let mut keys = KeySet::from_seed(1);
		let (a, b) = (keys.key(), keys.key());
		assert_eq!(a.cipher(&b.public()), b.cipher(&a.public()));
		assert_ne!(a.cipher(&b.public()), a.cipher(&keys.key().public()));
	}

	#[test]
	fn encipher_roundtrip() {
		let mut keys = KeySet::from_seed(2);
		let cipher = hash(b"cipher");
		let iv = keys.iv();
		let plain = b"attack at dawn, bring snacks".to_vec();
		let mut data = plain.clone();
		encipher(&cipher, &iv, &mut data);
		assert_ne!(data, plain);
		encipher(&cipher, &iv, &mut data);
		assert_eq!(data, plain);
	}

	#[test]
	fn sign_and_recover() {
		let mut keys = KeySet::from_seed(3);
		for _ in 0..16 {
			let prv = keys.key();
			let message = hash(&keys.id());
			let sig = prv.sign(&message).unwrap();
			assert_eq!(recover(&sig, &message).unwrap(), prv.public());
			let other = hash(b"some other message");
			// Recovery against another hash yields another key, or fails outright.
			assert_ne!(recover(&sig, &other).ok(), Some(prv.public()));
		}
	}

	#[test]
	fn key_encodings() {
		let mut keys = KeySet::from_seed(4);
		let prv = keys.key();
		assert_eq!(PrvKey::from_bytes(&prv.to_bytes()).unwrap(), prv);
		assert_eq!(PubKey::from_bytes(&prv.public().to_bytes()).unwrap(), prv.public());
		assert_eq!(PrvKey::from_bytes(&[0; PRV_SIZE]), Err(Error::InvalidPrivateKey));
	}
}

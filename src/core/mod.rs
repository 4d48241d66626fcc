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

// Onion protocol core. This module is network agnostic: it builds, encodes and decodes onions
// and keeps the session ledger, but never sends anything.

pub mod builder;
pub mod cloak;
pub mod crypto;
mod error;
pub mod onion;
pub mod registry;
pub mod sessions;
mod splice;

pub use error::Error;
pub use splice::Splice;

/// Size in bytes of a [`Magic`].
pub const MAGIC_SIZE: usize = 4;
/// Size in bytes of an [`Id`].
pub const ID_SIZE: usize = 16;
/// Size in bytes of an [`Iv`].
pub const IV_SIZE: usize = 16;
/// Size in bytes of a [`Hash`].
pub const HASH_SIZE: usize = 32;
/// Size in bytes of a compressed public key.
pub const PUB_SIZE: usize = 33;
/// Size in bytes of a serialized private key.
pub const PRV_SIZE: usize = 32;
/// Size in bytes of a compact recoverable signature.
pub const SIG_SIZE: usize = 65;
/// Size in bytes of an encoded timestamp.
pub const TIMESTAMP_SIZE: usize = 8;
/// Size in bytes of an encoded network address (length byte plus IPv6 address and port).
pub const ADDRESS_SIZE: usize = 1 + 16 + 2;

/// Number of hops on the return leg of a circuit.
pub const REPLY_HOPS: usize = 3;
/// Number of hops on the forward leg of a full circuit.
pub const FORWARD_HOPS: usize = 5;
/// Hop tag of the session a client holds with itself for the final return hop.
pub const RETURN_HOP: u8 = FORWARD_HOPS as u8;

/// 4-byte ASCII tag identifying an encoded variant.
pub type Magic = [u8; MAGIC_SIZE];
/// Random message or session identifier.
pub type Id = [u8; ID_SIZE];
/// Cipher initialization vector.
pub type Iv = [u8; IV_SIZE];
/// SHA-256 digest, also used as a symmetric cipher key.
pub type Hash = [u8; HASH_SIZE];
/// Compressed secp256k1 public key.
pub type PubBytes = [u8; PUB_SIZE];
/// Compact recoverable signature.
pub type SigBytes = [u8; SIG_SIZE];
/// One cipher per return hop, used to encrypt a reply payload.
pub type Ciphers = [Hash; REPLY_HOPS];
/// One nonce per return hop, matching [`Ciphers`].
pub type Nonces = [Iv; REPLY_HOPS];

/// Identifier that refers to nothing, used where an optional [`Id`] goes on the wire.
pub const NO_ID: Id = [0; ID_SIZE];

/// A fresh random identifier.
pub fn new_id() -> Id {
	use rand::RngCore;
	let mut id = NO_ID;
	rand::thread_rng().fill_bytes(&mut id);
	id
}

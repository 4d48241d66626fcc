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

//! Our recent private keys for one connection.
//!
//! After announcing a new key the peer may still have packets in flight under an older one, so a
//! bounded history is kept. Lookups try the newest key first; the oldest is dropped once the
//! history is full.
//!
//! All packets of a message share the sender's ephemeral key, so the shared cipher is cached per
//! sender key.

use crate::core::{
	cloak::{self, Cloak},
	crypto::{PrvKey, PubKey},
	Error, Hash, PubBytes,
};
use hashlink::LinkedHashMap;
use std::collections::VecDeque;

const CIPHER_CACHE: usize = 64;

struct Entry {
	key: PrvKey,
	public: PubBytes,
}

struct Cached {
	/// Our key the cipher was derived with.
	ours: PubBytes,
	cipher: Hash,
}

pub struct KeyRing {
	capacity: usize,
	/// Newest first.
	keys: VecDeque<Entry>,
	ciphers: LinkedHashMap<PubBytes, Cached>,
}

impl KeyRing {
	pub fn new(first: PrvKey, capacity: usize) -> Self {
		let mut ring = Self {
			capacity: capacity.max(1),
			keys: VecDeque::with_capacity(capacity),
			ciphers: LinkedHashMap::with_capacity(CIPHER_CACHE + 1),
		};
		ring.push(first);
		ring
	}

	pub fn push(&mut self, key: PrvKey) {
		let public = key.public().to_bytes();
		self.keys.push_front(Entry { key, public });
		if self.keys.len() > self.capacity {
			self.keys.truncate(self.capacity);
			self.ciphers.clear();
		}
	}

	/// The key we most recently announced.
	pub fn current(&self) -> Option<PubKey> {
		self.keys.front().map(|entry| entry.key.public())
	}

	/// The key `cloak` was made from, if we still hold it.
	fn find(&self, cloak: &Cloak) -> Option<&Entry> {
		self.keys.iter().find(|entry| cloak::matches(cloak, &entry.public))
	}

	/// Cipher shared with `sender` under whichever of our keys `cloak` names.
	pub fn cipher(&mut self, cloak: &Cloak, sender: &PubBytes) -> Result<Hash, Error> {
		if let Some(cached) = self.ciphers.get(sender) {
			if cloak::matches(cloak, &cached.ours) {
				return Ok(cached.cipher)
			}
		}
		let entry = self.find(cloak).ok_or(Error::NoMatchingKey)?;
		let cipher = entry.key.cipher(&PubKey::from_bytes(sender)?);
		let ours = entry.public;
		self.ciphers.insert(*sender, Cached { ours, cipher });
		if self.ciphers.len() > CIPHER_CACHE {
			self.ciphers.pop_front();
		}
		Ok(cipher)
	}
}

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

//! Magic-tagged codecs and the table that recognises them.

use super::{Error, Magic, Splice, MAGIC_SIZE};
use std::collections::HashMap;

/// A value with a fixed magic and a binary encoding.
pub trait Codec {
	fn magic(&self) -> Magic;
	/// Encoded length, including the magic and anything nested.
	fn len(&self) -> usize;
	/// Write the magic and everything after it.
	fn encode(&self, s: &mut Splice) -> Result<(), Error>;
	/// Read the fields following the magic, which has already been consumed.
	fn decode(&mut self, s: &mut Splice) -> Result<(), Error>;

	/// Encode into a fresh buffer of exactly [`len`](Self::len) bytes.
	fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut s = Splice::new(self.len());
		self.encode(&mut s)?;
		debug_assert_eq!(s.pos(), s.len(), "encode must write exactly len() bytes");
		Ok(s.into_vec())
	}
}

pub type Factory<T> = fn() -> T;

/// Table from magic to a constructor of an empty, undecoded value.
///
/// Filled once at startup and read-only after that.
pub struct Registry<T> {
	factories: HashMap<Magic, Factory<T>>,
}

impl<T: Codec> Registry<T> {
	pub fn new() -> Self {
		Self { factories: HashMap::new() }
	}

	/// Install `factory` under `magic`. A magic can only be registered once.
	pub fn register(&mut self, magic: Magic, factory: Factory<T>) -> &mut Self {
		let previous = self.factories.insert(magic, factory);
		debug_assert!(previous.is_none(), "magic {magic:?} registered twice");
		debug_assert_eq!(factory().magic(), magic);
		self
	}

	pub fn contains(&self, magic: &Magic) -> bool {
		self.factories.contains_key(magic)
	}

	/// Read the magic at the cursor and construct the matching empty value.
	///
	/// Returns `None` and leaves the cursor untouched when there are fewer than four bytes left or
	/// the magic is unknown.
	pub fn recognize(&self, s: &mut Splice) -> Option<T> {
		let magic = s.peek_magic().ok()?;
		let factory = self.factories.get(&magic)?;
		s.set_pos(s.pos() + MAGIC_SIZE);
		Some(factory())
	}

	/// Recognise and decode the value at the cursor.
	pub fn read(&self, s: &mut Splice) -> Result<T, Error> {
		let magic = s.peek_magic()?;
		let mut value = self.recognize(s).ok_or(Error::UnknownMagic(magic))?;
		value.decode(s)?;
		Ok(value)
	}
}

impl<T: Codec> Default for Registry<T> {
	fn default() -> Self {
		Self::new()
	}
}

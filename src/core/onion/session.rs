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

use super::{Layer, Onion};
use crate::core::{
	crypto::PrvKey,
	registry::Codec,
	sessions::{preimage, session_id},
	Error, Hash, Id, Splice, PRV_SIZE,
};
use std::time::Duration;

/// Zero-length terminator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct End;

impl Layer for End {
	fn len(&self) -> usize {
		0
	}

	fn encode(&self, _: &mut Splice) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, _: &mut Splice) -> Result<(), Error> {
		Ok(())
	}
}

/// Delivers the two private keys of a paid-for session to the relay at `hop`.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
	pub hop: u8,
	pub header: Option<PrvKey>,
	pub payload: Option<PrvKey>,
	pub onion: Box<Onion>,
}

impl Session {
	pub fn new(hop: u8, header: PrvKey, payload: PrvKey) -> Self {
		Self { hop, header: Some(header), payload: Some(payload), onion: Box::new(Onion::End(End)) }
	}

	fn keys(&self) -> Result<(&PrvKey, &PrvKey), Error> {
		match (&self.header, &self.payload) {
			(Some(header), Some(payload)) => Ok((header, payload)),
			_ => Err(Error::InvalidPrivateKey),
		}
	}

	/// Payment claim token of the delivered keys.
	pub fn preimage(&self) -> Result<Hash, Error> {
		let (header, payload) = self.keys()?;
		Ok(preimage(header, payload))
	}

	pub fn id(&self) -> Result<Id, Error> {
		Ok(session_id(&self.preimage()?))
	}
}

impl Default for Session {
	fn default() -> Self {
		Self { hop: 0, header: None, payload: None, onion: Box::new(Onion::End(End)) }
	}
}

impl Layer for Session {
	fn len(&self) -> usize {
		1 + 2 * PRV_SIZE + self.onion.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		let (header, payload) = self.keys()?;
		s.put_u8(self.hop)?;
		s.put_prv(header)?;
		s.put_prv(payload)?;
		self.onion.encode(s)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(1 + 2 * PRV_SIZE)?;
		self.hop = s.read_u8()?;
		self.header = Some(s.read_prv()?);
		self.payload = Some(s.read_prv()?);
		Ok(())
	}
}

/// Holds the rest of the message back for `duration` before handling it.
#[derive(Clone, Debug, PartialEq)]
pub struct Delay {
	pub duration: Duration,
	pub onion: Box<Onion>,
}

impl Delay {
	pub fn new(duration: Duration) -> Self {
		Self { duration, onion: Box::new(Onion::End(End)) }
	}
}

impl Default for Delay {
	fn default() -> Self {
		Self::new(Duration::ZERO)
	}
}

impl Layer for Delay {
	fn len(&self) -> usize {
		8 + self.onion.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		let millis = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX);
		s.put_u64(millis)?;
		self.onion.encode(s)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		self.duration = Duration::from_millis(s.read_u64()?);
		Ok(())
	}
}

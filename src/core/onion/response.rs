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

use super::Layer;
use crate::core::{Error, Id, Splice, ID_SIZE};

/// Acknowledges a message that travelled the whole circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Confirmation {
	pub id: Id,
	/// Load of the node that produced it.
	pub load: u8,
}

impl Layer for Confirmation {
	fn len(&self) -> usize {
		ID_SIZE + 1
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_id(&self.id)?;
		s.put_u8(self.load)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.id = s.read_id()?;
		self.load = s.read_u8()?;
		Ok(())
	}
}

/// Result of an exit request or introduction query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
	pub id: Id,
	pub port: u16,
	pub load: u8,
	pub bytes: Vec<u8>,
}

impl Layer for Response {
	fn len(&self) -> usize {
		ID_SIZE + 2 + 1 + 4 + self.bytes.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_id(&self.id)?;
		s.put_u16(self.port)?;
		s.put_u8(self.load)?;
		s.put_bytes(&self.bytes)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(ID_SIZE + 2 + 1 + 4)?;
		self.id = s.read_id()?;
		self.port = s.read_u16()?;
		self.load = s.read_u8()?;
		self.bytes = s.read_bytes()?;
		Ok(())
	}
}

/// Remaining balance of a session, in millisatoshi.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Balance {
	pub id: Id,
	pub msat: u64,
}

impl Layer for Balance {
	fn len(&self) -> usize {
		ID_SIZE + 8
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_id(&self.id)?;
		s.put_u64(self.msat)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.id = s.read_id()?;
		self.msat = s.read_u64()?;
		Ok(())
	}
}

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

//! Requests answered by the node that unwraps them, along a reply header they cannot read.

use super::{Layer, ReplyHeader, REPLY_HEADER_LEN};
use crate::core::{Error, Id, PubBytes, Splice, ID_SIZE, PUB_SIZE};

/// Bytes for a local service listening on `port` at the exit node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exit {
	pub id: Id,
	pub port: u16,
	pub bytes: Vec<u8>,
	pub reply: ReplyHeader,
}

impl Layer for Exit {
	fn len(&self) -> usize {
		REPLY_HEADER_LEN + ID_SIZE + 2 + 4 + self.bytes.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		self.reply.encode(s)?;
		s.put_id(&self.id)?;
		s.put_u16(self.port)?;
		s.put_bytes(&self.bytes)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(REPLY_HEADER_LEN + ID_SIZE + 2 + 4)?;
		self.reply = ReplyHeader::decode(s)?;
		self.id = s.read_id()?;
		self.port = s.read_u16()?;
		self.bytes = s.read_bytes()?;
		Ok(())
	}
}

/// Asks the node for the remaining balance of `session`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetBalance {
	pub id: Id,
	pub session: Id,
	pub reply: ReplyHeader,
}

impl Layer for GetBalance {
	fn len(&self) -> usize {
		REPLY_HEADER_LEN + 2 * ID_SIZE
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		self.reply.encode(s)?;
		s.put_id(&self.id)?;
		s.put_id(&self.session)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.reply = ReplyHeader::decode(s)?;
		self.id = s.read_id()?;
		self.session = s.read_id()?;
		Ok(())
	}
}

/// Asks the node for the introduction of the hidden service with `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntroQuery {
	pub id: Id,
	pub key: PubBytes,
	pub reply: ReplyHeader,
}

impl Default for IntroQuery {
	fn default() -> Self {
		Self { id: Id::default(), key: [0; PUB_SIZE], reply: ReplyHeader::default() }
	}
}

impl Layer for IntroQuery {
	fn len(&self) -> usize {
		REPLY_HEADER_LEN + ID_SIZE + PUB_SIZE
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		self.reply.encode(s)?;
		s.put_id(&self.id)?;
		s.put_pub_bytes(&self.key)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.reply = ReplyHeader::decode(s)?;
		self.id = s.read_id()?;
		self.key = s.read_pub_bytes()?;
		Ok(())
	}
}

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

use super::{End, Layer, Onion};
use crate::core::{registry::Codec, Error, Id, Splice, ADDRESS_SIZE};
use std::net::{Ipv4Addr, SocketAddr};

/// Next-hop address of a Forward or Reverse layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Hop {
	pub address: SocketAddr,
	/// Relay session that accounts for this hop, set while handling.
	pub session: Option<Id>,
	pub onion: Box<Onion>,
}

impl Hop {
	pub fn new(address: SocketAddr) -> Self {
		Self { address, session: None, onion: Box::new(Onion::End(End)) }
	}
}

impl Default for Hop {
	fn default() -> Self {
		Self::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
	}
}

impl Layer for Hop {
	fn len(&self) -> usize {
		ADDRESS_SIZE + self.onion.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_address(&self.address)?;
		self.onion.encode(s)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		self.address = s.read_address()?;
		Ok(())
	}
}

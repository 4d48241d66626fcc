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

use super::Dispatcher;
use crate::{core::Error, traits::Transport};
use parking_lot::RwLock;
use std::{collections::HashMap, net::SocketAddr};

/// Dispatchers of the connections to our neighbours, by neighbour address.
#[derive(Default)]
pub struct Links {
	links: RwLock<HashMap<SocketAddr, Dispatcher>>,
}

impl Links {
	pub fn new() -> Self {
		Self::default()
	}

	/// Route messages for `address` through `dispatcher`, replacing any previous link.
	pub fn add(&self, address: SocketAddr, dispatcher: Dispatcher) -> Option<Dispatcher> {
		self.links.write().insert(address, dispatcher)
	}

	pub fn remove(&self, address: &SocketAddr) -> Option<Dispatcher> {
		self.links.write().remove(address)
	}

	pub fn get(&self, address: &SocketAddr) -> Option<Dispatcher> {
		self.links.read().get(address).cloned()
	}

	pub fn len(&self) -> usize {
		self.links.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.links.read().is_empty()
	}
}

impl Transport for Links {
	fn send(&self, to: &SocketAddr, buf: Vec<u8>) -> Result<(), Error> {
		self.get(to).ok_or(Error::NoLink(*to))?.try_queue(buf)
	}
}

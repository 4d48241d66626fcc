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

use std::{
	net::{Ipv4Addr, SocketAddr},
	time::Duration,
};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// The target for log messages.
	pub log_target: &'static str,
	/// Address other nodes reach this one at. Forward and Reverse layers naming it are unwrapped
	/// locally.
	pub address: SocketAddr,
	/// Millisatoshi charged per MiB relayed over a session with this node.
	pub relay_rate: u64,
	/// How long an exit waits for a local service to answer. A service that does not answer in
	/// time gets an empty response sent on its behalf.
	pub exit_timeout: Duration,
	/// Maximum number of requests awaiting a reply. The oldest are forgotten past this.
	pub pending_capacity: usize,
	/// Requests still unanswered after this long are forgotten.
	pub pending_ttl: Duration,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			log_target: "veilnet",
			address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
			relay_rate: 1_000,
			exit_timeout: Duration::from_secs(5),
			pending_capacity: 1024,
			pending_ttl: Duration::from_secs(60),
		}
	}
}

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

use crate::core::sessions::MIB;
use std::time::Duration;

/// Dispatcher configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// The target for log messages.
	pub log_target: &'static str,
	/// Largest packet written to the connection, headers included.
	pub mtu: usize,
	/// Initial number of parity shards per 256-shard section. Adjusted as acknowledgements come
	/// in; 64 is 25% of a full section.
	pub parity: u8,
	/// Round trip time assumed until one is reported.
	pub initial_ping: Duration,
	/// How often partial messages and unacknowledged sends are checked on.
	pub gc_interval: Duration,
	/// A partial message gets this many round trip times after its newest packet before it is
	/// given up on.
	pub fail_after_pings: u32,
	/// Rotate our key after receiving this many bytes.
	pub rekey_after_bytes: usize,
	/// Number of our past keys to keep accepting packets for.
	pub key_history: usize,
	/// Capacity of the outbound message queue.
	pub queue_capacity: usize,
	/// Number of finished message IDs remembered, so that late packets are dropped quietly.
	pub completed_capacity: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			log_target: "veilnet",
			mtu: 1382,
			parity: 64,
			initial_ping: Duration::from_millis(100),
			gc_interval: Duration::from_secs(1),
			fail_after_pings: 10,
			rekey_after_bytes: MIB as usize,
			key_history: 32,
			queue_capacity: 256,
			completed_capacity: 1024,
		}
	}
}

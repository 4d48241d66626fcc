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

//! Requests waiting for their reply.

use crate::core::{onion::ReplyHeader, sessions::Billable, Id, PubBytes};
use hashlink::{linked_hash_map::Entry, LinkedHashMap};
use std::time::{Duration, Instant};

/// What came back for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
	Confirmation { load: u8 },
	Response { port: u16, load: u8, bytes: Vec<u8> },
	Balance { msat: u64 },
	/// A hidden service accepted our route. `forwards` reaches it.
	Ready { address: PubBytes, forwards: ReplyHeader },
	/// A hidden service answered one of our messages.
	Message { address: PubBytes, id: Id, payload: Vec<u8>, forwards: ReplyHeader },
}

/// Run at most once, when the reply arrives. Dropped without being run if the request expires.
pub type Callback = Box<dyn FnOnce(Reply) + Send>;

struct PendingResponse {
	/// Debited once the reply is in.
	billable: Vec<Billable>,
	sent: Instant,
	callback: Callback,
}

/// Insertion ordered table of requests, bounded in size and age.
pub struct PendingResponses {
	capacity: usize,
	ttl: Duration,
	responses: LinkedHashMap<Id, PendingResponse>,
}

impl PendingResponses {
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		let responses = LinkedHashMap::with_capacity(
			// Plus one because we only evict _after_ going over the limit
			capacity.saturating_add(1),
		);
		Self { capacity, ttl, responses }
	}

	/// Register a request. Replaces any request with the same ID.
	pub fn add(&mut self, id: Id, billable: Vec<Billable>, callback: Callback, now: Instant) {
		self.expire(now);
		self.responses.remove(&id);
		self.responses.insert(id, PendingResponse { billable, sent: now, callback });
		if self.responses.len() > self.capacity {
			self.responses.pop_front();
		}
	}

	/// Remove the request `id` was sent with, if it is still waiting.
	pub fn process(&mut self, id: &Id, now: Instant) -> Option<(Vec<Billable>, Callback)> {
		match self.responses.entry(*id) {
			Entry::Occupied(entry) if now.saturating_duration_since(entry.get().sent) < self.ttl => {
				let response = entry.remove();
				Some((response.billable, response.callback))
			},
			Entry::Occupied(entry) => {
				entry.remove();
				None
			},
			Entry::Vacant(_) => None,
		}
	}

	/// Forget requests older than the TTL. Returns how many were forgotten.
	pub fn expire(&mut self, now: Instant) -> usize {
		let mut expired = 0;
		while let Some((_, response)) = self.responses.front() {
			if now.saturating_duration_since(response.sent) < self.ttl {
				break
			}
			self.responses.pop_front();
			expired += 1;
		}
		expired
	}

	pub fn contains(&self, id: &Id) -> bool {
		self.responses.contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.responses.len()
	}

	pub fn is_empty(&self) -> bool {
		self.responses.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	fn counting(calls: &Arc<AtomicUsize>) -> Callback {
		let calls = calls.clone();
		Box::new(move |_| {
			calls.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[test]
	fn reply_is_processed_once() {
		let calls = Arc::new(AtomicUsize::new(0));
		let mut pending = PendingResponses::new(4, Duration::from_secs(60));
		let now = Instant::now();
		let bill = Billable { session: [7; 16], cost: 3 };
		pending.add([1; 16], vec![bill], counting(&calls), now);

		let (billable, callback) = pending.process(&[1; 16], now).unwrap();
		assert_eq!(billable, vec![bill]);
		callback(Reply::Confirmation { load: 0 });
		assert!(pending.process(&[1; 16], now).is_none());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn expired_requests_are_dropped_unanswered() {
		let calls = Arc::new(AtomicUsize::new(0));
		let ttl = Duration::from_secs(10);
		let mut pending = PendingResponses::new(4, ttl);
		let start = Instant::now();
		pending.add([1; 16], Vec::new(), counting(&calls), start);
		pending.add([2; 16], Vec::new(), counting(&calls), start + Duration::from_secs(5));

		assert!(pending.process(&[1; 16], start + ttl).is_none());
		assert!(!pending.contains(&[1; 16]));
		assert_eq!(pending.expire(start + Duration::from_secs(15)), 1);
		assert!(pending.is_empty());
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn oldest_are_evicted_past_capacity() {
		let calls = Arc::new(AtomicUsize::new(0));
		let mut pending = PendingResponses::new(2, Duration::from_secs(60));
		let now = Instant::now();
		for i in 0..3 {
			pending.add([i; 16], Vec::new(), counting(&calls), now);
		}
		assert_eq!(pending.len(), 2);
		assert!(!pending.contains(&[0; 16]));
		assert!(pending.contains(&[2; 16]));
	}
}

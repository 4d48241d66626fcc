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

//! Redundancy control.
//!
//! Every acknowledgement yields two samples: the share of transmitted bytes that never arrived,
//! and how much longer the message took than a bare round trip. While the link loses, parity is
//! scaled by the rolling mean of both. A loss free acknowledgement clears the loss history and
//! scales parity by its own round trip alone, relaxed, so parity decays as soon as loss stops.

use arrayvec::ArrayVec;

/// Samples kept for the rolling means.
const WINDOW: usize = 8;
const MIN_PARITY: f64 = 1.0;
const MAX_PARITY: f64 = 255.0;
/// Applied on top when an acknowledgement reports no loss.
const RELAX: f64 = 0.9;

#[derive(Default)]
struct Rolling(ArrayVec<f64, WINDOW>);

impl Rolling {
	fn push(&mut self, sample: f64) {
		if self.0.is_full() {
			self.0.remove(0);
		}
		self.0.push(sample);
	}

	fn clear(&mut self) {
		self.0.clear();
	}

	fn mean(&self) -> f64 {
		if self.0.is_empty() {
			return 0.0
		}
		self.0.iter().sum::<f64>() / self.0.len() as f64
	}
}

pub struct ParityControl {
	parity: f64,
	errors: Rolling,
	divergences: Rolling,
}

impl ParityControl {
	pub fn new(parity: u8) -> Self {
		Self {
			parity: f64::from(parity).clamp(MIN_PARITY, MAX_PARITY),
			errors: Rolling::default(),
			divergences: Rolling::default(),
		}
	}

	/// Parity shards per full section, as used for the next message.
	pub fn value(&self) -> u8 {
		self.parity.round() as u8
	}

	/// Feed one acknowledgement. `error` is the lost share of the transmitted bytes, `divergence`
	/// the ratio of the transfer's round trip to the plain ping. Returns the new parity.
	pub fn update(&mut self, error: f64, divergence: f64) -> u8 {
		let error = if error.is_finite() { error.clamp(0.0, 1.0) } else { 1.0 };
		let divergence = if divergence.is_finite() { divergence.max(0.0) } else { 1.0 };
		self.divergences.push(divergence);

		let parity = if error == 0.0 {
			self.errors.clear();
			self.parity * divergence * RELAX
		} else {
			self.errors.push(error);
			self.parity * self.divergences.mean() * (1.0 + self.errors.mean())
		};
		self.parity = parity.clamp(MIN_PARITY, MAX_PARITY);
		self.value()
	}
}

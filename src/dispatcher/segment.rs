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

//! Splitting messages into erasure coded shards and putting them back together.
//!
//! A message is cut into equal shards, zero padded at the end, and the shards are grouped into
//! sections of at most 256. A full section carries `256 - parity` data shards and `parity` parity
//! shards. The last section may hold fewer data shards and gets proportionally fewer parity
//! shards, but never none. A shard's sequence number is `section * 256 + index`.

use crate::core::Error;
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::collections::HashMap;

pub const SECTION_SHARDS: usize = 256;
pub const MAX_SECTIONS: usize = 256;

/// Data and parity shard counts of one section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
	pub data: usize,
	pub parity: usize,
}

impl Section {
	pub fn total(&self) -> usize {
		self.data + self.parity
	}
}

/// How a message of `length` bytes is cut into shards of `shard_len` bytes.
pub fn sections(length: usize, shard_len: usize, parity: u8) -> Result<Vec<Section>, Error> {
	if shard_len == 0 {
		return Err(Error::BadSegment)
	}
	let parity = usize::from(parity.max(1));
	let per_section = SECTION_SHARDS - parity;
	let mut data = length.div_ceil(shard_len).max(1);
	if data.div_ceil(per_section) > MAX_SECTIONS {
		return Err(Error::MessageTooLarge)
	}
	let mut out = Vec::new();
	while data > 0 {
		let count = data.min(per_section);
		let section_parity =
			if count == per_section { parity } else { (count * parity).div_ceil(per_section).max(1) };
		out.push(Section { data: count, parity: section_parity });
		data -= count;
	}
	Ok(out)
}

/// Number of packets a message of `length` bytes is sent as.
pub fn expected_packets(length: usize, shard_len: usize, parity: u8) -> Result<usize, Error> {
	Ok(sections(length, shard_len, parity)?.iter().map(Section::total).sum())
}

pub fn seq(section: usize, index: usize) -> u16 {
	(section * SECTION_SHARDS + index) as u16
}

fn position(seq: u16) -> (usize, usize) {
	let seq = usize::from(seq);
	(seq / SECTION_SHARDS, seq % SECTION_SHARDS)
}

/// Erasure code `message`. Returns every shard, data and parity, with its sequence number.
pub fn encode(message: &[u8], shard_len: usize, parity: u8) -> Result<Vec<(u16, Vec<u8>)>, Error> {
	let layout = sections(message.len(), shard_len, parity)?;
	let mut chunks = message.chunks(shard_len);
	let mut out = Vec::with_capacity(layout.iter().map(Section::total).sum());
	for (number, section) in layout.iter().enumerate() {
		let mut shards: Vec<Vec<u8>> = (0..section.total())
			.map(|i| {
				let mut shard = vec![0; shard_len];
				if i < section.data {
					if let Some(chunk) = chunks.next() {
						shard[..chunk.len()].copy_from_slice(chunk);
					}
				}
				shard
			})
			.collect();
		ReedSolomon::new(section.data, section.parity)?.encode(&mut shards)?;
		out.extend(shards.into_iter().enumerate().map(|(i, shard)| (seq(number, i), shard)));
	}
	Ok(out)
}

/// Whether `shards` holds enough of every section to rebuild the message.
pub fn sufficient(
	length: usize,
	shard_len: usize,
	parity: u8,
	shards: &HashMap<u16, Vec<u8>>,
) -> Result<bool, Error> {
	let layout = sections(length, shard_len, parity)?;
	let mut have = vec![0; layout.len()];
	for seq in shards.keys() {
		let (section, index) = position(*seq);
		if layout.get(section).is_some_and(|s| index < s.total()) {
			have[section] += 1;
		}
	}
	Ok(layout.iter().zip(have).all(|(section, have)| have >= section.data))
}

/// Rebuild a message of `length` bytes from whatever shards arrived.
///
/// Fails if any section is missing more shards than it has parity. Shards of the wrong length or
/// outside the layout are ignored.
pub fn reassemble(
	length: usize,
	shard_len: usize,
	parity: u8,
	shards: &HashMap<u16, Vec<u8>>,
) -> Result<Vec<u8>, Error> {
	let layout = sections(length, shard_len, parity)?;
	let mut slots: Vec<Vec<Option<Vec<u8>>>> =
		layout.iter().map(|section| vec![None; section.total()]).collect();
	for (seq, shard) in shards {
		let (section, index) = position(*seq);
		if shard.len() != shard_len {
			continue
		}
		if let Some(slot) = slots.get_mut(section).and_then(|slots| slots.get_mut(index)) {
			*slot = Some(shard.clone());
		}
	}

	let mut message = Vec::with_capacity(layout.iter().map(|s| s.data).sum::<usize>() * shard_len);
	for (section, mut slots) in layout.iter().zip(slots) {
		if slots[..section.data].iter().any(Option::is_none) {
			if slots.iter().flatten().count() < section.data {
				return Err(Error::BadSegment)
			}
			ReedSolomon::new(section.data, section.parity)?.reconstruct_data(&mut slots)?;
		}
		for shard in slots.into_iter().take(section.data) {
			message.extend_from_slice(&shard.ok_or(Error::BadSegment)?);
		}
	}
	message.truncate(length);
	Ok(message)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{seq::SliceRandom, RngCore, SeedableRng};
	use rand_xoshiro::Xoshiro256PlusPlus;

	const SHARD: usize = 100;

	fn message(len: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<u8> {
		let mut message = vec![0; len];
		rng.fill_bytes(&mut message);
		message
	}

	#[test]
	fn section_layout() {
		assert_eq!(sections(0, SHARD, 64).unwrap(), vec![Section { data: 1, parity: 1 }]);
		assert_eq!(sections(64 * SHARD, SHARD, 64).unwrap(), vec![Section { data: 64, parity: 22 }]);
		assert_eq!(
			sections(200 * SHARD, SHARD, 64).unwrap(),
			vec![Section { data: 192, parity: 64 }, Section { data: 8, parity: 3 }]
		);
		assert_eq!(sections(SHARD, SHARD, 0).unwrap(), vec![Section { data: 1, parity: 1 }]);
		assert_eq!(expected_packets(255 * 256 * SHARD, SHARD, 1).unwrap(), 256 * 256);
		assert_eq!(sections(255 * 256 * SHARD + 1, SHARD, 1), Err(Error::MessageTooLarge));
	}

	#[test]
	fn survives_loss_up_to_parity() {
		let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
		let original = message(64 * SHARD - 17, &mut rng);
		let mut shards = encode(&original, SHARD, 64).unwrap();
		assert_eq!(shards.len(), 64 + 22);
		shards.shuffle(&mut rng);

		let kept: HashMap<_, _> = shards.iter().skip(22).cloned().collect();
		assert!(sufficient(original.len(), SHARD, 64, &kept).unwrap());
		assert_eq!(reassemble(original.len(), SHARD, 64, &kept).unwrap(), original);

		let kept: HashMap<_, _> = shards.iter().skip(23).cloned().collect();
		assert!(!sufficient(original.len(), SHARD, 64, &kept).unwrap());
		assert_eq!(reassemble(original.len(), SHARD, 64, &kept), Err(Error::BadSegment));
	}

	#[test]
	fn multi_section_message() {
		let mut rng = Xoshiro256PlusPlus::seed_from_u64(12);
		let original = message(300 * SHARD + 5, &mut rng);
		let shards = encode(&original, SHARD, 32).unwrap();
		let layout = sections(original.len(), SHARD, 32).unwrap();
		assert_eq!(layout.len(), 2);
		assert_eq!(shards.len(), expected_packets(original.len(), SHARD, 32).unwrap());

		// Lose the first shards of every section, as many as each can take.
		let kept: HashMap<_, _> = shards
			.into_iter()
			.filter(|(seq, _)| {
				let (section, index) = position(*seq);
				index >= layout[section].parity
			})
			.collect();
		assert_eq!(reassemble(original.len(), SHARD, 32, &kept).unwrap(), original);
	}

	#[test]
	fn foreign_shards_are_ignored() {
		let original = b"a short message".to_vec();
		let mut shards: HashMap<_, _> = encode(&original, SHARD, 8).unwrap().into_iter().collect();
		shards.insert(seq(3, 0), vec![0; SHARD]);
		shards.insert(seq(0, 200), vec![0; SHARD]);
		shards.remove(&0);
		assert_eq!(reassemble(original.len(), SHARD, 8, &shards).unwrap(), original);
	}
}

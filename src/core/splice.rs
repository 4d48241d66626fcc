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

//! Binary cursor over a single byte buffer.
//!
//! A [`Splice`] is created with the exact encoded length of what will be written into it, written
//! once left to right, and then either transmitted or read once left to right on the receiving
//! side. Every typed `put_*`/`read_*` advances the cursor by exactly the encoded width of the value.
//! Reading past the end is an error, never a panic.

use super::{
	cloak::{Cloak, CLOAK_SIZE},
	crypto::{PrvKey, PubKey},
	Ciphers, Error, Hash, Id, Iv, Magic, Nonces, PubBytes, SigBytes, ADDRESS_SIZE, HASH_SIZE,
	ID_SIZE, IV_SIZE, MAGIC_SIZE, PRV_SIZE, PUB_SIZE, REPLY_HOPS, SIG_SIZE,
};
use rand::RngCore;
use std::{
	net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
	time::{Duration, SystemTime, UNIX_EPOCH},
};

const ADDRESS_V4_LEN: u8 = 4 + 2;
const ADDRESS_V6_LEN: u8 = 16 + 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice {
	buf: Vec<u8>,
	pos: usize,
}

impl Splice {
	/// Zero-filled buffer of `len` bytes, cursor at the start.
	pub fn new(len: usize) -> Self {
		Self { buf: vec![0; len], pos: 0 }
	}

	/// Wrap received bytes for reading.
	pub fn load(buf: Vec<u8>) -> Self {
		Self { buf, pos: 0 }
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Move the cursor. Positions past the end are clamped to the end.
	pub fn set_pos(&mut self, pos: usize) {
		self.pos = pos.min(self.buf.len());
	}

	pub fn remaining(&self) -> usize {
		self.buf.len() - self.pos
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.buf
	}

	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.buf
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.buf
	}

	/// Fails unless at least `need` bytes remain after the cursor.
	pub fn require(&self, need: usize) -> Result<(), Error> {
		if self.remaining() < need {
			return Err(Error::TooShort { need, have: self.remaining() })
		}
		Ok(())
	}

	fn take(&mut self, n: usize) -> Result<&[u8], Error> {
		self.require(n)?;
		let start = self.pos;
		self.pos += n;
		Ok(&self.buf[start..self.pos])
	}

	fn take_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
		let mut out = [0; N];
		out.copy_from_slice(self.take(N)?);
		Ok(out)
	}

	fn space(&mut self, n: usize) -> Result<&mut [u8], Error> {
		if self.remaining() < n {
			return Err(Error::Overflow { need: n, have: self.remaining() })
		}
		let start = self.pos;
		self.pos += n;
		Ok(&mut self.buf[start..self.pos])
	}

	/// Write bytes without a length prefix.
	pub fn put_raw(&mut self, data: &[u8]) -> Result<(), Error> {
		self.space(data.len())?.copy_from_slice(data);
		Ok(())
	}

	pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, Error> {
		Ok(self.take(n)?.to_vec())
	}

	/// Fill `n` bytes with random noise.
	pub fn put_noise(&mut self, n: usize) -> Result<(), Error> {
		rand::thread_rng().fill_bytes(self.space(n)?);
		Ok(())
	}

	/// Skip `n` bytes.
	pub fn skip(&mut self, n: usize) -> Result<(), Error> {
		self.take(n).map(|_| ())
	}

	/// Write a byte blob prefixed with its u32 length.
	pub fn put_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
		let len = u32::try_from(data.len()).map_err(|_| Error::MessageTooLarge)?;
		self.put_u32(len)?;
		self.put_raw(data)
	}

	pub fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u32()? as usize;
		self.read_raw(len)
	}

	pub fn put_u8(&mut self, v: u8) -> Result<(), Error> {
		self.put_raw(&[v])
	}

	pub fn read_u8(&mut self) -> Result<u8, Error> {
		Ok(self.take_array::<1>()?[0])
	}

	pub fn put_u16(&mut self, v: u16) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_u16(&mut self) -> Result<u16, Error> {
		Ok(u16::from_le_bytes(self.take_array()?))
	}

	pub fn put_u32(&mut self, v: u32) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_u32(&mut self) -> Result<u32, Error> {
		Ok(u32::from_le_bytes(self.take_array()?))
	}

	pub fn put_u64(&mut self, v: u64) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_u64(&mut self) -> Result<u64, Error> {
		Ok(u64::from_le_bytes(self.take_array()?))
	}

	pub fn put_i16(&mut self, v: i16) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_i16(&mut self) -> Result<i16, Error> {
		Ok(i16::from_le_bytes(self.take_array()?))
	}

	pub fn put_i32(&mut self, v: i32) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_i32(&mut self) -> Result<i32, Error> {
		Ok(i32::from_le_bytes(self.take_array()?))
	}

	pub fn put_i64(&mut self, v: i64) -> Result<(), Error> {
		self.put_raw(&v.to_le_bytes())
	}

	pub fn read_i64(&mut self) -> Result<i64, Error> {
		Ok(i64::from_le_bytes(self.take_array()?))
	}

	pub fn put_magic(&mut self, magic: &Magic) -> Result<(), Error> {
		self.put_raw(magic)
	}

	pub fn read_magic(&mut self) -> Result<Magic, Error> {
		self.take_array::<MAGIC_SIZE>()
	}

	/// The magic at the cursor, without consuming it.
	pub fn peek_magic(&self) -> Result<Magic, Error> {
		self.require(MAGIC_SIZE)?;
		let mut magic = Magic::default();
		magic.copy_from_slice(&self.buf[self.pos..self.pos + MAGIC_SIZE]);
		Ok(magic)
	}

	pub fn put_id(&mut self, id: &Id) -> Result<(), Error> {
		self.put_raw(id)
	}

	pub fn read_id(&mut self) -> Result<Id, Error> {
		self.take_array::<ID_SIZE>()
	}

	pub fn put_iv(&mut self, iv: &Iv) -> Result<(), Error> {
		self.put_raw(iv)
	}

	pub fn read_iv(&mut self) -> Result<Iv, Error> {
		self.take_array::<IV_SIZE>()
	}

	pub fn put_hash(&mut self, hash: &Hash) -> Result<(), Error> {
		self.put_raw(hash)
	}

	pub fn read_hash(&mut self) -> Result<Hash, Error> {
		self.take_array::<HASH_SIZE>()
	}

	pub fn put_pub(&mut self, key: &PubKey) -> Result<(), Error> {
		self.put_raw(&key.to_bytes())
	}

	/// Read a compressed public key, rejecting bytes that are not a curve point.
	pub fn read_pub(&mut self) -> Result<PubKey, Error> {
		PubKey::from_bytes(&self.read_pub_bytes()?)
	}

	pub fn put_pub_bytes(&mut self, key: &PubBytes) -> Result<(), Error> {
		self.put_raw(key)
	}

	pub fn read_pub_bytes(&mut self) -> Result<PubBytes, Error> {
		self.take_array::<PUB_SIZE>()
	}

	pub fn put_prv(&mut self, key: &PrvKey) -> Result<(), Error> {
		self.put_raw(&key.to_bytes()[..])
	}

	pub fn read_prv(&mut self) -> Result<PrvKey, Error> {
		let bytes = zeroize::Zeroizing::new(self.take_array::<PRV_SIZE>()?);
		PrvKey::from_bytes(&bytes)
	}

	pub fn put_sig(&mut self, sig: &SigBytes) -> Result<(), Error> {
		self.put_raw(sig)
	}

	pub fn read_sig(&mut self) -> Result<SigBytes, Error> {
		self.take_array::<SIG_SIZE>()
	}

	pub fn put_cloak(&mut self, cloak: &Cloak) -> Result<(), Error> {
		self.put_raw(cloak)
	}

	pub fn read_cloak(&mut self) -> Result<Cloak, Error> {
		self.take_array::<CLOAK_SIZE>()
	}

	/// Unix timestamp with second resolution.
	pub fn put_time(&mut self, time: SystemTime) -> Result<(), Error> {
		let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
		self.put_u64(secs)
	}

	pub fn read_time(&mut self) -> Result<SystemTime, Error> {
		Ok(UNIX_EPOCH + Duration::from_secs(self.read_u64()?))
	}

	/// Network address: one length byte, then the ip and little-endian port, zero padded to the
	/// fixed field width.
	pub fn put_address(&mut self, address: &SocketAddr) -> Result<(), Error> {
		let field = self.space(ADDRESS_SIZE)?;
		field.fill(0);
		let port = address.port().to_le_bytes();
		match address.ip() {
			IpAddr::V4(ip) => {
				field[0] = ADDRESS_V4_LEN;
				field[1..5].copy_from_slice(&ip.octets());
				field[5..7].copy_from_slice(&port);
			},
			IpAddr::V6(ip) => {
				field[0] = ADDRESS_V6_LEN;
				field[1..17].copy_from_slice(&ip.octets());
				field[17..19].copy_from_slice(&port);
			},
		}
		Ok(())
	}

	pub fn read_address(&mut self) -> Result<SocketAddr, Error> {
		let field = self.take_array::<ADDRESS_SIZE>()?;
		match field[0] {
			ADDRESS_V4_LEN => {
				let mut ip = [0; 4];
				ip.copy_from_slice(&field[1..5]);
				let port = u16::from_le_bytes([field[5], field[6]]);
				Ok(SocketAddr::new(Ipv4Addr::from(ip).into(), port))
			},
			ADDRESS_V6_LEN => {
				let mut ip = [0; 16];
				ip.copy_from_slice(&field[1..17]);
				let port = u16::from_le_bytes([field[17], field[18]]);
				Ok(SocketAddr::new(Ipv6Addr::from(ip).into(), port))
			},
			_ => Err(Error::InvalidAddress),
		}
	}

	pub fn put_ciphers(&mut self, ciphers: &Ciphers) -> Result<(), Error> {
		for cipher in ciphers {
			self.put_hash(cipher)?;
		}
		Ok(())
	}

	pub fn read_ciphers(&mut self) -> Result<Ciphers, Error> {
		self.require(REPLY_HOPS * HASH_SIZE)?;
		let mut ciphers = Ciphers::default();
		for cipher in &mut ciphers {
			*cipher = self.read_hash()?;
		}
		Ok(ciphers)
	}

	pub fn put_nonces(&mut self, nonces: &Nonces) -> Result<(), Error> {
		for nonce in nonces {
			self.put_iv(nonce)?;
		}
		Ok(())
	}

	pub fn read_nonces(&mut self) -> Result<Nonces, Error> {
		self.require(REPLY_HOPS * IV_SIZE)?;
		let mut nonces = Nonces::default();
		for nonce in &mut nonces {
			*nonce = self.read_iv()?;
		}
		Ok(nonces)
	}
}

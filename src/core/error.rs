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

//! Error handling

use super::Magic;

/// Veilnet generic error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// Reading past the end of a buffer.
	#[error("Buffer too short: need {need} bytes, have {have}.")]
	TooShort { need: usize, have: usize },
	/// Writing past the end of a fixed-length buffer.
	#[error("Buffer overflow: writing {need} bytes, {have} remaining.")]
	Overflow { need: usize, have: usize },
	/// Magic not present in the registry.
	#[error("Unrecognized magic {0:?}.")]
	UnknownMagic(Magic),
	/// A specific variant was expected at this position.
	#[error("Expected magic {expected:?}, found {found:?}.")]
	UnexpectedMagic { expected: Magic, found: Magic },
	#[error("Invalid public key.")]
	InvalidPublicKey,
	#[error("Invalid private key.")]
	InvalidPrivateKey,
	/// Signature could not be parsed or recovered, or recovered to another key.
	#[error("Invalid signature.")]
	InvalidSignature,
	#[error("Invalid network address.")]
	InvalidAddress,
	/// No local key matches a cloaked key; the message is not for us.
	#[error("No local key matches the cloaked key.")]
	NoMatchingKey,
	#[error("Session not found.")]
	SessionNotFound,
	/// Checked session debit failed.
	#[error("Insufficient session balance.")]
	InsufficientBalance,
	/// Identity-addressed traffic that does not open with a session delivery.
	#[error("Identity-addressed message without a session.")]
	Unauthenticated,
	/// No payment registered for a delivered session.
	#[error("No pending payment for session preimage.")]
	PaymentNotFound,
	/// A terminal variant was asked to wrap another layer.
	#[error("{0} is terminal and cannot wrap another layer.")]
	Terminal(&'static str),
	/// A reply arrived for a request that is not pending.
	#[error("No request is waiting for this reply.")]
	NoReply,
	/// Intro advertisement past its expiry.
	#[error("Introduction expired.")]
	Expired,
	#[error("Service not available here.")]
	UnknownService,
	/// Attempting to send oversized message.
	#[error("Message is too large.")]
	MessageTooLarge,
	/// Invalid segment format.
	#[error("Bad segment.")]
	BadSegment,
	#[error("Erasure coding failed: {0}.")]
	Erasure(String),
	/// Queue is full.
	#[error("Queue is full.")]
	QueueFull,
	#[error("Channel closed.")]
	Closed,
	/// No connection to the node at this address.
	#[error("No link to {0}.")]
	NoLink(std::net::SocketAddr),
}

impl From<reed_solomon_erasure::Error> for Error {
	fn from(e: reed_solomon_erasure::Error) -> Self {
		Error::Erasure(format!("{e:?}"))
	}
}

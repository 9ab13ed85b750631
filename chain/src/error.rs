// Copyright 2019 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for chain

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

/// Error definition
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Chain error definitions
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// A block with the same number and hash is already on the chain
	#[fail(display = "Block already processed")]
	AlreadyProcessed,
	/// No block at the requested height
	#[fail(display = "Block not found: {}", _0)]
	BlockNotFound(u64),
	/// Side block older than the maximum rewind depth below the head
	#[fail(display = "Block out of fork window")]
	OutOfForkWindow,
	/// Non-extending block while forks were not allowed
	#[fail(display = "Fork not allowed")]
	ForkRejected,
	/// The rules engine rejected the block
	#[fail(display = "Invalid block: {}", _0)]
	InvalidBlock(String),
	/// A ranged block query asked for more blocks than permitted
	#[fail(display = "Range is too large: {}", _0)]
	RangeTooLarge(u64),
	/// Internal issue when trying to save or load data from store
	#[fail(display = "Store Error: {}", _0)]
	StoreErr(String),
	/// Anything else
	#[fail(display = "Other Error: {}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

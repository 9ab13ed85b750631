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

//! All the rules required for a currency to reach consensus across the
//! whole network are complex and hard to completely isolate. Some can be
//! simple parameters (like the universal dividend recurrence), others
//! complex algorithms (like web-of-trust distance). However, as long as
//! they're simple enough, consensus-relevant constants and short
//! functions should be kept here.

/// A side branch must be ahead of the canonical chain by the equivalent
/// of this many minutes (both in blocks and in median time) before the
/// node abandons its current chain for it.
pub const SWITCH_ON_BRANCH_AHEAD_BY_X_MINUTES: u64 = 30;

/// Interval in seconds between two runs of the old-block migration task.
pub const MEMORY_CLEAN_INTERVAL: u64 = 300;

/// The maximum number of blocks a single ranged query may return. Only
/// for DoS protection.
pub const MAX_BLOCKS_BETWEEN: u64 = 5000;

/// How many nonces the prover tries between two looks at its cancellation
/// token. Cancellation latency is bounded by the time one batch takes.
pub const POW_NONCE_BATCH: u64 = 1000;

/// Proof-of-work validity for a given difficulty level. Each full 16
/// units of difficulty require one more leading zero on the block hash;
/// the remainder caps the value of the first digit after the zeros.
pub fn valid_pow(hash: &str, difficulty: u32) -> bool {
	let zeros = (difficulty / 16) as usize;
	let remainder = difficulty % 16;
	let mut chars = hash.chars();
	for _ in 0..zeros {
		if chars.next() != Some('0') {
			return false;
		}
	}
	match chars.next().and_then(|c| c.to_digit(16)) {
		Some(first) => first <= 15 - remainder,
		None => false,
	}
}

/// Monetary mass recurrence: the mass after a block is the mass before it
/// plus the dividend it emits multiplied by the number of members it pays.
pub fn monetary_mass(previous: u64, dividend: Option<u64>, members_count: u64) -> u64 {
	match dividend {
		Some(ud) => previous + ud * members_count,
		None => previous,
	}
}

/// Universal dividend clock: advances by `dt` seconds on every block that
/// emits a dividend, stands still otherwise.
pub fn ud_time(previous: i64, dividend: Option<u64>, dt: i64) -> i64 {
	match dividend {
		Some(_) => previous + dt,
		None => previous,
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pow_leading_zeros() {
		assert!(valid_pow("00A7C1", 32));
		assert!(!valid_pow("00A7C1", 48));
		// remainder 8 caps the first digit at 7
		assert!(valid_pow("0075FF", 24));
		assert!(!valid_pow("00F5FF", 24));
		// difficulty 0 accepts anything with at least one digit
		assert!(valid_pow("FF", 0));
		assert!(!valid_pow("", 0));
	}

	#[test]
	fn mass_and_ud_clock() {
		assert_eq!(monetary_mass(100, None, 3), 100);
		assert_eq!(monetary_mass(100, Some(5), 3), 115);
		assert_eq!(ud_time(1000, None, 86400), 1000);
		assert_eq!(ud_time(1000, Some(5), 86400), 87400);
	}
}

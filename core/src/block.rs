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

//! Blocks and block hashing. A block carries the documents written at its
//! height plus the consensus metadata; a few fields (`monetary_mass`,
//! `ud_time`, `fork`, `wrong`) are derived by the chain when the block is
//! inserted and never enter the hash.

use blake2_rfc::blake2b::blake2b;

use crate::tx::Transaction;
use crate::wot::{Certification, Identity, Membership, Revocation};

/// A block of the weft chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
	/// Currency name, fixed by the root block.
	pub currency: String,
	/// Height of the block; 0 is the root.
	pub number: u64,
	/// Content hash of the block.
	pub hash: String,
	/// Hash of the previous block, empty on the root.
	pub previous_hash: String,
	/// Public key of the member that forged the block.
	pub issuer: String,
	/// Detached signature by the issuer.
	pub signature: String,
	/// Median time of the block window, in seconds.
	pub median_time: i64,
	/// Common proof-of-work difficulty at this block.
	pub pow_min: u32,
	/// Nonce mutated by the prover until the hash satisfies the
	/// difficulty.
	pub nonce: u64,
	/// Number of members once this block is applied.
	pub members_count: u64,
	/// Universal dividend emitted by this block, if any.
	pub dividend: Option<u64>,
	/// Power-of-ten base of amounts in this block.
	pub unit_base: u32,
	/// Currency parameters, root block only.
	pub parameters: Option<String>,
	/// New identities written by this block.
	pub identities: Vec<Identity>,
	/// Memberships of identities joining the members set.
	pub joiners: Vec<Membership>,
	/// Memberships of members confirming their membership.
	pub actives: Vec<Membership>,
	/// Memberships of members asking to leave.
	pub leavers: Vec<Membership>,
	/// Identities revoked by their own key.
	pub revoked: Vec<Revocation>,
	/// Public keys excluded from the members set.
	pub excluded: Vec<String>,
	/// Certifications written by this block.
	pub certifications: Vec<Certification>,
	/// Transactions written by this block.
	pub transactions: Vec<Transaction>,

	/// Cumulative currency issued up to and including this block.
	/// Assigned on main-chain insertion.
	pub monetary_mass: u64,
	/// Timestamp of the last dividend emission as of this block.
	/// Assigned on main-chain insertion.
	pub ud_time: i64,
	/// True iff the block is recorded on a side chain.
	pub fork: bool,
	/// Set when a chain switch through this block failed.
	pub wrong: bool,
}

impl Block {
	/// An empty block at the given position of the chain.
	pub fn empty(number: u64, previous_hash: &str) -> Block {
		Block {
			currency: String::new(),
			number,
			hash: String::new(),
			previous_hash: previous_hash.to_owned(),
			issuer: String::new(),
			signature: String::new(),
			median_time: 0,
			pow_min: 0,
			nonce: 0,
			members_count: 0,
			dividend: None,
			unit_base: 0,
			parameters: None,
			identities: vec![],
			joiners: vec![],
			actives: vec![],
			leavers: vec![],
			revoked: vec![],
			excluded: vec![],
			certifications: vec![],
			transactions: vec![],
			monetary_mass: 0,
			ud_time: 0,
			fork: false,
			wrong: false,
		}
	}

	/// Blockstamp of the block, `number-hash`.
	pub fn stamp(&self) -> String {
		format!("{}-{}", self.number, self.hash)
	}

	/// The hashed content of the block minus the nonce: every consensus
	/// field and document, excluding the fields derived at insertion.
	pub fn pre_pow(&self) -> String {
		let mut lines = vec![
			format!("Currency: {}", self.currency),
			format!("Number: {}", self.number),
			format!("PreviousHash: {}", self.previous_hash),
			format!("Issuer: {}", self.issuer),
			format!("MedianTime: {}", self.median_time),
			format!("PoWMin: {}", self.pow_min),
			format!("MembersCount: {}", self.members_count),
			format!("UnitBase: {}", self.unit_base),
		];
		if let Some(ud) = self.dividend {
			lines.push(format!("UniversalDividend: {}", ud));
		}
		if let Some(ref params) = self.parameters {
			lines.push(format!("Parameters: {}", params));
		}
		for idty in &self.identities {
			lines.push(idty.compact());
		}
		for ms in self.joiners.iter().chain(&self.actives).chain(&self.leavers) {
			lines.push(ms.compact());
		}
		for rev in &self.revoked {
			lines.push(rev.compact());
		}
		for pubkey in &self.excluded {
			lines.push(pubkey.clone());
		}
		for cert in &self.certifications {
			lines.push(cert.compact());
		}
		for tx in &self.transactions {
			lines.push(tx.compact());
		}
		lines.push(format!("Signature: {}", self.signature));
		lines.join("\n")
	}

	/// Content hash over the pre-PoW part and the nonce, uppercase hex.
	pub fn compute_hash(&self) -> String {
		let data = format!("{}\nNonce: {}\n", self.pre_pow(), self.nonce);
		let digest = blake2b(32, &[], data.as_bytes());
		let mut hex = String::with_capacity(64);
		for byte in digest.as_bytes() {
			hex.push_str(&format!("{:02X}", byte));
		}
		hex
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hash_covers_nonce_and_content() {
		let mut b = Block::empty(4, "ABCD");
		b.issuer = "GfKERHnJTYzKhKUma5h1uWhetbA8yHKymhVH2sUPhA1d".to_owned();
		let h1 = b.compute_hash();
		b.nonce += 1;
		let h2 = b.compute_hash();
		assert_ne!(h1, h2);
		b.nonce -= 1;
		assert_eq!(h1, b.compute_hash());

		let mut c = b.clone();
		c.median_time = 12;
		assert_ne!(h1, c.compute_hash());
	}

	#[test]
	fn derived_fields_stay_out_of_the_hash() {
		let mut b = Block::empty(4, "ABCD");
		let h1 = b.compute_hash();
		b.monetary_mass = 1000;
		b.ud_time = 99;
		b.fork = true;
		b.wrong = true;
		assert_eq!(h1, b.compute_hash());
	}
}

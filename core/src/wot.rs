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

//! Web-of-trust documents carried by blocks and the materialized rows the
//! chain derives from them.

/// A self-declared identity: a public key bound to a unique identifier,
/// anchored at the blockstamp it was signed against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Identity {
	/// Base58 public key of the declared identity.
	pub pubkey: String,
	/// Unique identifier (nickname) claimed by the key.
	pub uid: String,
	/// Blockstamp (`number-hash`) the identity document was signed against.
	pub buid: String,
	/// Detached signature of the identity document.
	pub sig: String,
	/// Whether the identity is currently a member.
	pub member: bool,
	/// Whether the identity has ever been a member.
	pub was_member: bool,
	/// Whether the identity revoked itself.
	pub revoked: bool,
	/// Block number of the last membership document written for this
	/// identity, -1 when none was ever written.
	pub ms_number: i64,
	/// Block number this row was written at.
	pub written_on: u64,
}

impl Identity {
	/// A fresh, non-member identity as carried by a block.
	pub fn new(pubkey: &str, uid: &str, buid: &str, sig: &str) -> Identity {
		Identity {
			pubkey: pubkey.to_owned(),
			uid: uid.to_owned(),
			buid: buid.to_owned(),
			sig: sig.to_owned(),
			member: false,
			was_member: false,
			revoked: false,
			ms_number: -1,
			written_on: 0,
		}
	}

	/// Inline form used for hashing the enclosing block.
	pub fn compact(&self) -> String {
		format!("{}:{}:{}:{}", self.pubkey, self.sig, self.buid, self.uid)
	}
}

/// What a membership document does to its issuer's membership.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipKind {
	/// Entry into the members set.
	Join,
	/// Confirmation of an ongoing membership.
	Active,
	/// Announced departure from the members set.
	Leave,
}

/// A membership document: an identity asking to join, confirm or leave
/// the set of members.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Membership {
	/// Public key of the identity the membership is about.
	pub issuer: String,
	/// Join, confirm or leave. Normalized by the chain from the block
	/// list the document was carried in.
	pub kind: MembershipKind,
	/// Number of the block the membership was signed against.
	pub number: u64,
	/// Hash of the block the membership was signed against.
	pub block_hash: String,
	/// Detached signature of the membership document.
	pub sig: String,
	/// Median time of the block the membership was written in. Used to
	/// compute its expiry.
	pub median_time: i64,
	/// Block number this row was written at.
	pub written_on: u64,
	/// Set when the membership aged past its validity window.
	pub expired: bool,
}

impl Membership {
	/// Inline form used for hashing the enclosing block.
	pub fn compact(&self) -> String {
		format!("{}:{}:{}-{}", self.issuer, self.sig, self.number, self.block_hash)
	}
}

/// A certification: one member vouching for another identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Certification {
	/// Public key of the certifier.
	pub from: String,
	/// Public key of the certified identity.
	pub to: String,
	/// Number of the block the certification was signed against.
	pub block_number: u64,
	/// Detached signature of the certification document.
	pub sig: String,
	/// Median time of the block the certification was signed against,
	/// the origin of its validity window.
	pub timestamp: i64,
	/// Block number this row was written at.
	pub written_on: u64,
	/// Set when the certification aged past its validity window.
	pub expired: bool,
}

impl Certification {
	/// Inline form used for hashing the enclosing block.
	pub fn compact(&self) -> String {
		format!("{}:{}:{}:{}", self.from, self.to, self.block_number, self.sig)
	}
}

/// An explicit revocation of an identity by its own key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Revocation {
	/// Public key of the revoked identity.
	pub pubkey: String,
	/// Detached signature of the revocation document.
	pub sig: String,
}

impl Revocation {
	/// Inline form used for hashing the enclosing block.
	pub fn compact(&self) -> String {
		format!("{}:{}", self.pubkey, self.sig)
	}
}

/// A directed trust edge derived from a written certification, the raw
/// material of the web-of-trust distance rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Link {
	/// Public key of the certifier.
	pub source: String,
	/// Public key of the certified identity.
	pub target: String,
	/// Median time of the block the link was written in.
	pub timestamp: i64,
	/// Block number this row was written at.
	pub written_on: u64,
	/// Set when the link aged out of the distance computation.
	pub obsolete: bool,
}

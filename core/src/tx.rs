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

//! Transactions and the money sources they consume and create. A source
//! is either a universal dividend (`D`) or a transaction output (`T`);
//! both are spendable under the conditions attached to them.

/// The two origins a money source can have.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
	/// Universal dividend emitted to a member.
	D,
	/// Transaction output.
	T,
}

impl SourceKind {
	/// One-letter form used in source identifiers.
	pub fn letter(&self) -> &'static str {
		match *self {
			SourceKind::D => "D",
			SourceKind::T => "T",
		}
	}
}

/// A spendable amount of currency held by a public key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Source {
	/// Dividend or transaction output.
	pub kind: SourceKind,
	/// Public key the source belongs to.
	pub pubkey: String,
	/// Number of the block that created the source.
	pub number: u64,
	/// Disambiguates several sources created by one block: the hash of
	/// the creating transaction for `T`, the pubkey again for `D`.
	pub fingerprint: String,
	/// Amount, expressed in `10^base` units.
	pub amount: u64,
	/// Power-of-ten base of the amount.
	pub base: u32,
	/// Unlock conditions, e.g. `SIG(<pubkey>)`.
	pub conditions: String,
	/// Whether the source has been spent.
	pub consumed: bool,
	/// Block number the source was spent at, when it was.
	pub consumed_on: Option<u64>,
}

impl Source {
	/// Identifier a transaction input uses to designate this source.
	pub fn id(&self) -> String {
		format!("{}:{}:{}", self.kind.letter(), self.number, self.fingerprint)
	}
}

/// A transaction input: a reference to an existing source, with the
/// issuer it draws from denormalized onto it at admission time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TxInput {
	/// Index into the enclosing transaction's issuer list.
	pub issuer_index: usize,
	/// Public key of the drawing issuer. Empty until the admission
	/// pipeline denormalizes it from the issuer list.
	pub pubkey: String,
	/// Kind of the consumed source.
	pub kind: SourceKind,
	/// Number of the block that created the consumed source.
	pub number: u64,
	/// Fingerprint of the consumed source.
	pub fingerprint: String,
	/// Amount drawn.
	pub amount: u64,
	/// Power-of-ten base of the amount.
	pub base: u32,
}

impl TxInput {
	/// Identifier of the source this input consumes.
	pub fn source_id(&self) -> String {
		format!("{}:{}:{}", self.kind.letter(), self.number, self.fingerprint)
	}
}

/// A transaction output, which becomes a `T` source once written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TxOutput {
	/// Public key the output is locked to.
	pub pubkey: String,
	/// Amount, expressed in `10^base` units.
	pub amount: u64,
	/// Power-of-ten base of the amount.
	pub base: u32,
}

/// A transfer of sources between keys.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
	/// Content hash of the transaction document.
	pub hash: String,
	/// Public keys drawing money in.
	pub issuers: Vec<String>,
	/// Consumed sources.
	pub inputs: Vec<TxInput>,
	/// Created sources.
	pub outputs: Vec<TxOutput>,
	/// One detached signature per issuer.
	pub signatures: Vec<String>,
}

impl Transaction {
	/// Inline form used for hashing the enclosing block.
	pub fn compact(&self) -> String {
		format!(
			"{}:{}:{}:{}",
			self.hash,
			self.issuers.join(","),
			self.inputs.len(),
			self.outputs.len()
		)
	}
}

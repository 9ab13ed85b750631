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

//! Base types that the block chain pipeline requires: validation options,
//! chain configuration, and the contracts of the collaborators the
//! service consumes (storage, rules engine, block generator, downstream
//! adapter).

use crate::core::block::Block;
use crate::core::tx::Source;
use crate::core::wot::{Certification, Identity, Link, Membership};
use crate::error::Error;

bitflags! {
	/// Options for block validation
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0000;
		/// Do not verify signatures and proof-of-work, structure only
		const SKIP_POW = 0b0000_0001;
		/// Block applied during an initial bulk load
		const SYNC = 0b0000_0010;
		/// Block mined by ourselves
		const MINE = 0b0000_0100;
	}
}

/// Chain-relevant configuration of the node.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChainConfig {
	/// Name of the currency this chain carries.
	pub currency: String,
	/// Maximum rewind depth below the head at which a side block is
	/// still admitted.
	pub forksize: u64,
	/// Target seconds between two blocks.
	pub avg_gen_time: u64,
	/// Lifetime of a membership, in seconds.
	pub ms_validity: i64,
	/// Lifetime of a certification, in seconds.
	pub sig_validity: i64,
	/// Seconds between two universal dividend emissions.
	pub dt: i64,
	/// Self-throttle in seconds after a block of our own.
	pub pow_delay: u64,
	/// Whether this node takes part in proof-of-work generation.
	pub participate: bool,
	/// Public key of the local keypair, when one is configured.
	pub pair: Option<String>,
}

impl Default for ChainConfig {
	fn default() -> ChainConfig {
		ChainConfig {
			currency: "weft".to_owned(),
			forksize: 100,
			avg_gen_time: 300,
			ms_validity: 31_557_600,
			sig_validity: 63_115_200,
			dt: 86_400,
			pow_delay: 0,
			participate: false,
			pair: None,
		}
	}
}

/// The per-block activity counters the chain keeps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
	/// Blocks writing new identities.
	Newcomers,
	/// Blocks writing certifications.
	Certs,
	/// Blocks writing joining memberships.
	Joiners,
	/// Blocks writing confirming memberships.
	Actives,
	/// Blocks writing leaving memberships.
	Leavers,
	/// Blocks writing revocations.
	Revoked,
	/// Blocks excluding members.
	Excluded,
	/// Blocks emitting a universal dividend.
	Ud,
	/// Blocks carrying transactions.
	Tx,
}

impl Stat {
	/// Every counter, in storage order.
	pub const ALL: [Stat; 9] = [
		Stat::Newcomers,
		Stat::Certs,
		Stat::Joiners,
		Stat::Actives,
		Stat::Leavers,
		Stat::Revoked,
		Stat::Excluded,
		Stat::Ud,
		Stat::Tx,
	];

	/// Storage name of the counter.
	pub fn name(&self) -> &'static str {
		match *self {
			Stat::Newcomers => "newcomers",
			Stat::Certs => "certs",
			Stat::Joiners => "joiners",
			Stat::Actives => "actives",
			Stat::Leavers => "leavers",
			Stat::Revoked => "revoked",
			Stat::Excluded => "excluded",
			Stat::Ud => "ud",
			Stat::Tx => "tx",
		}
	}

	/// Whether the given block counts as active for this counter: a
	/// non-empty document list, or a set scalar field.
	pub fn triggered(&self, b: &Block) -> bool {
		match *self {
			Stat::Newcomers => !b.identities.is_empty(),
			Stat::Certs => !b.certifications.is_empty(),
			Stat::Joiners => !b.joiners.is_empty(),
			Stat::Actives => !b.actives.is_empty(),
			Stat::Leavers => !b.leavers.is_empty(),
			Stat::Revoked => !b.revoked.is_empty(),
			Stat::Excluded => !b.excluded.is_empty(),
			Stat::Ud => b.dividend.map(|ud| ud > 0).unwrap_or(false),
			Stat::Tx => !b.transactions.is_empty(),
		}
	}
}

/// A change of membership state for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberChange {
	/// Public key of the identity.
	pub pubkey: String,
	/// New membership state.
	pub member: bool,
	/// Block number of the membership document backing the change.
	pub ms_number: i64,
}

/// Every index mutation the application of one block entails. The store
/// applies a delta atomically and keeps enough before-images to reverse
/// it with `revert_index`.
#[derive(Debug, Clone, Default)]
pub struct IndexDelta {
	/// Identity rows to create.
	pub identities: Vec<Identity>,
	/// Membership state transitions.
	pub member_changes: Vec<MemberChange>,
	/// Public keys revoked by their own key.
	pub revocations: Vec<String>,
	/// Membership rows to create.
	pub memberships: Vec<Membership>,
	/// Certification rows to create.
	pub certifications: Vec<Certification>,
	/// Trust links to create.
	pub links: Vec<Link>,
	/// Money sources to create.
	pub sources: Vec<Source>,
	/// Identifiers of sources consumed by transactions.
	pub consumed_sources: Vec<String>,
	/// Certifications aged past their validity window.
	pub expired_certs: Vec<Certification>,
	/// Memberships aged past their validity window.
	pub expired_memberships: Vec<Membership>,
	/// Links aged out of the distance computation.
	pub obsolete_links: Vec<Link>,
}

impl IndexDelta {
	/// True when the delta carries no mutation at all.
	pub fn is_empty(&self) -> bool {
		self.identities.is_empty()
			&& self.member_changes.is_empty()
			&& self.revocations.is_empty()
			&& self.memberships.is_empty()
			&& self.certifications.is_empty()
			&& self.links.is_empty()
			&& self.sources.is_empty()
			&& self.consumed_sources.is_empty()
			&& self.expired_certs.is_empty()
			&& self.expired_memberships.is_empty()
			&& self.obsolete_links.is_empty()
	}
}

/// Snapshot of an identity before it joins, as known by the generator
/// pools and the written indices.
#[derive(Debug, Clone)]
pub struct PreJoinData {
	/// The identity document.
	pub identity: Identity,
	/// Whether the identity was a member at some point in the past.
	pub was_member: bool,
	/// Block number of the identity's last written membership, -1 when
	/// none exists.
	pub current_msn: i64,
}

/// Reference to the block below which certifications no longer count.
/// `number` is -1 when the chain is too young to have one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExcludingBlockRef {
	/// Number of the excluding block, -1 when unknown.
	pub number: i64,
	/// Hash of the excluding block, empty when unknown.
	pub hash: String,
}

/// Trait the chain pipeline requires an implementor for in order to
/// persist blocks and the materialized indices derived from them.
pub trait ChainStore: Send + Sync {
	/// The current head of the canonical chain, none before the root.
	fn head(&self) -> Result<Option<Block>, Error>;

	/// Canonical block at the given height.
	fn get_block(&self, number: u64) -> Result<Block, Error>;

	/// Canonical block at the given height, if any.
	fn get_block_or_null(&self, number: u64) -> Result<Option<Block>, Error>;

	/// Canonical block matching both number and hash, if any.
	fn block_by_number_and_hash(&self, number: u64, hash: &str) -> Result<Option<Block>, Error>;

	/// Block matching number and hash across the canonical chain and
	/// every side chain.
	fn absolute_block_by_number_and_hash(
		&self,
		number: u64,
		hash: &str,
	) -> Result<Option<Block>, Error>;

	/// Ascending canonical slice of at most `count` blocks starting at
	/// `from`.
	fn blocks_between(&self, from: u64, count: u64) -> Result<Vec<Block>, Error>;

	/// Append a block to the canonical chain.
	fn append_block(&self, block: &Block) -> Result<(), Error>;

	/// Remove and return the canonical head.
	fn pop_block(&self) -> Result<Block, Error>;

	/// Append a contiguous ascending segment to the canonical chain.
	fn save_bunch(&self, blocks: &[Block]) -> Result<(), Error>;

	/// Every persisted side block.
	fn fork_blocks(&self) -> Result<Vec<Block>, Error>;

	/// Persist a side block, including its `wrong` marker.
	fn save_side_block(&self, block: &Block) -> Result<(), Error>;

	/// Drop the side record for the given block, if any.
	fn remove_side_block(&self, number: u64, hash: &str) -> Result<(), Error>;

	/// Flag a side block as having been part of a failed switch.
	fn set_side_block_wrong(&self, number: u64, hash: &str) -> Result<(), Error>;

	/// Persist the currency parameters carried by the root block.
	fn save_parameters(&self, parameters: &str) -> Result<(), Error>;

	/// The persisted currency parameters, if any.
	fn parameters(&self) -> Result<Option<String>, Error>;

	/// Apply the index mutations of block `number` atomically, keeping
	/// before-images so the application can be reversed.
	fn apply_index(&self, number: u64, delta: &IndexDelta) -> Result<(), Error>;

	/// Reverse every index mutation recorded for block `number`.
	fn revert_index(&self, number: u64) -> Result<(), Error>;

	/// Identity row for the given public key, if any.
	fn identity(&self, pubkey: &str) -> Result<Option<Identity>, Error>;

	/// Every current member.
	fn members(&self) -> Result<Vec<Identity>, Error>;

	/// Whether the given public key is a current member.
	fn is_member(&self, pubkey: &str) -> Result<bool, Error>;

	/// Every non-obsolete trust link.
	fn valid_links(&self) -> Result<Vec<Link>, Error>;

	/// Non-obsolete trust links pointing at the given public key.
	fn valid_links_to(&self, pubkey: &str) -> Result<Vec<Link>, Error>;

	/// Non-expired certifications received by the given public key.
	fn valid_certs_to(&self, pubkey: &str) -> Result<Vec<Certification>, Error>;

	/// Latest joining membership written for the given public key.
	fn last_join_of(&self, pubkey: &str) -> Result<Option<Membership>, Error>;

	/// Non-expired certifications whose validity origin is at or before
	/// the given time.
	fn certs_older_than(&self, max_ts: i64) -> Result<Vec<Certification>, Error>;

	/// Non-expired memberships whose validity origin is at or before the
	/// given time.
	fn memberships_older_than(&self, max_ts: i64) -> Result<Vec<Membership>, Error>;

	/// Non-obsolete links whose validity origin is at or before the
	/// given time.
	fn links_older_than(&self, max_ts: i64) -> Result<Vec<Link>, Error>;

	/// The canonical block at which certifications older than
	/// `sig_validity` seconds stop counting.
	fn certification_excluding_block(&self, sig_validity: i64) -> Result<Block, Error>;

	/// Every source held by the given public key.
	fn sources_of(&self, pubkey: &str) -> Result<Vec<Source>, Error>;

	/// Record a block as active for the given counter.
	fn push_stat(&self, stat: Stat, number: u64) -> Result<(), Error>;

	/// Block numbers recorded as active for the given counter.
	fn stat_blocks(&self, stat: Stat) -> Result<Vec<u64>, Error>;

	/// Migrate blocks out of the hot working set. Returns how many
	/// records were moved.
	fn migrate_old_blocks(&self) -> Result<u64, Error>;
}

/// The consensus rule set, consumed but not defined by the chain service.
pub trait Rules: Send + Sync {
	/// Validate a block, to the depth selected by `opts`.
	fn check_block(
		&self,
		block: &Block,
		opts: Options,
		store: &dyn ChainStore,
		conf: &ChainConfig,
	) -> Result<(), Error>;

	/// Personalized proof-of-work difficulty for the given issuer.
	fn trial_level(
		&self,
		pubkey: &str,
		conf: &ChainConfig,
		store: &dyn ChainStore,
	) -> Result<u32, Error>;

	/// Web-of-trust stability: whether the identity would sit more than
	/// three hops away from some member, given the provisional links.
	fn is_over_3_hops(
		&self,
		pubkey: &str,
		links: &[Link],
		newcomers: &[String],
		current: Option<&Block>,
		conf: &ChainConfig,
		store: &dyn ChainStore,
	) -> Result<bool, Error>;
}

/// The block generator pooling pending documents, consumed by the
/// service for candidate blocks and pre-join snapshots.
pub trait Generator: Send + Sync {
	/// A hand-made root block, only meaningful before the chain starts.
	fn manual_root(&self, conf: &ChainConfig, store: &dyn ChainStore) -> Result<Block, Error>;

	/// The next candidate block, assembled from the pending pools.
	fn next_block(&self, conf: &ChainConfig, store: &dyn ChainStore) -> Result<Block, Error>;

	/// The next candidate block with every document pool ignored.
	fn next_empty_block(&self, conf: &ChainConfig, store: &dyn ChainStore)
		-> Result<Block, Error>;

	/// Pre-join snapshot of an identity.
	fn pre_join_data(&self, pubkey: &str, store: &dyn ChainStore) -> Result<PreJoinData, Error>;

	/// Certifications the pools would write for the given identities,
	/// assuming membership at block `target_number`.
	fn compute_new_certs(
		&self,
		target_number: u64,
		pubkeys: &[String],
		store: &dyn ChainStore,
	) -> Result<Vec<Certification>, Error>;

	/// Convert provisional certifications into provisional trust links.
	fn new_certs_to_links(&self, certs: &[Certification]) -> Vec<Link>;
}

/// Bridge between the chain pipeline and the rest of the system. Handles
/// downstream processing of valid blocks by the rest of the system.
pub trait ChainAdapter: Send + Sync {
	/// The blockchain pipeline has accepted this block as valid and
	/// added it to our chain.
	fn block_accepted(&self, b: &Block);
}

/// Dummy adapter used as a placeholder to allow various tests to pass.
pub struct NoopAdapter {}

impl ChainAdapter for NoopAdapter {
	fn block_accepted(&self, _b: &Block) {}
}

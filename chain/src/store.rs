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

//! Implements the storage contract required by the chain with plain
//! in-memory maps. The node's persistent key-value store implements the
//! same trait elsewhere; this one backs the tests and light deployments.
//! Index mutations are journaled with before-images so any applied block
//! can be reversed exactly.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::block::Block;
use crate::core::tx::Source;
use crate::core::wot::{Certification, Identity, Link, Membership, MembershipKind};
use crate::error::{Error, ErrorKind};
use crate::types::{ChainStore, IndexDelta, Stat};

/// How many blocks below the head stay in the hot working set; side
/// records and undo journals older than this are migrated away.
const HOT_WINDOW: u64 = 200;

#[derive(Debug, Clone, Default)]
struct UndoLog {
	// before-images; a `None` identity image means the row was created
	// by the journaled block and must be dropped on revert
	identities: Vec<(String, Option<Identity>)>,
	sources: Vec<(String, Source)>,
	certs: Vec<Certification>,
	memberships: Vec<Membership>,
	links: Vec<Link>,
}

#[derive(Default)]
struct StatRecord {
	blocks: Vec<u64>,
	last_parsed: u64,
}

#[derive(Default)]
struct StoreInner {
	chain: Vec<Block>,
	side: HashMap<(u64, String), Block>,
	identities: HashMap<String, Identity>,
	memberships: Vec<Membership>,
	certs: Vec<Certification>,
	links: Vec<Link>,
	sources: Vec<Source>,
	parameters: Option<String>,
	stats: HashMap<&'static str, StatRecord>,
	undo: HashMap<u64, UndoLog>,
}

/// An implementation of the chain storage contract backed by in-memory
/// maps behind a single read-write lock.
pub struct MemStore {
	inner: RwLock<StoreInner>,
}

impl MemStore {
	/// A fresh, empty store.
	pub fn new() -> MemStore {
		MemStore {
			inner: RwLock::new(StoreInner::default()),
		}
	}
}

impl Default for MemStore {
	fn default() -> MemStore {
		MemStore::new()
	}
}

impl StoreInner {
	fn capture_identity(&self, undo: &mut UndoLog, pubkey: &str) {
		if !undo.identities.iter().any(|(pk, _)| pk == pubkey) {
			undo.identities
				.push((pubkey.to_owned(), self.identities.get(pubkey).cloned()));
		}
	}

	fn capture_source(&self, undo: &mut UndoLog, id: &str) {
		if !undo.sources.iter().any(|(sid, _)| sid == id) {
			if let Some(src) = self.sources.iter().find(|s| s.id() == id) {
				undo.sources.push((id.to_owned(), src.clone()));
			}
		}
	}
}

impl ChainStore for MemStore {
	fn head(&self) -> Result<Option<Block>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.chain.last().cloned())
	}

	fn get_block(&self, number: u64) -> Result<Block, Error> {
		self.get_block_or_null(number)?
			.ok_or_else(|| ErrorKind::BlockNotFound(number).into())
	}

	fn get_block_or_null(&self, number: u64) -> Result<Option<Block>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.chain.get(number as usize).cloned())
	}

	fn block_by_number_and_hash(&self, number: u64, hash: &str) -> Result<Option<Block>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.chain
			.get(number as usize)
			.filter(|b| b.hash == hash)
			.cloned())
	}

	fn absolute_block_by_number_and_hash(
		&self,
		number: u64,
		hash: &str,
	) -> Result<Option<Block>, Error> {
		if let Some(b) = self.block_by_number_and_hash(number, hash)? {
			return Ok(Some(b));
		}
		let inner = self.inner.read().unwrap();
		Ok(inner.side.get(&(number, hash.to_owned())).cloned())
	}

	fn blocks_between(&self, from: u64, count: u64) -> Result<Vec<Block>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.chain
			.iter()
			.skip(from as usize)
			.take(count as usize)
			.cloned()
			.collect())
	}

	fn append_block(&self, block: &Block) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		if block.number as usize != inner.chain.len() {
			return Err(ErrorKind::StoreErr(format!(
				"block {} does not extend the chain at height {}",
				block.number,
				inner.chain.len()
			))
			.into());
		}
		inner.chain.push(block.clone());
		Ok(())
	}

	fn pop_block(&self) -> Result<Block, Error> {
		let mut inner = self.inner.write().unwrap();
		inner
			.chain
			.pop()
			.ok_or_else(|| ErrorKind::StoreErr("no block to pop".to_owned()).into())
	}

	fn save_bunch(&self, blocks: &[Block]) -> Result<(), Error> {
		for b in blocks {
			self.append_block(b)?;
		}
		Ok(())
	}

	fn fork_blocks(&self) -> Result<Vec<Block>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.side.values().cloned().collect())
	}

	fn save_side_block(&self, block: &Block) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner
			.side
			.insert((block.number, block.hash.clone()), block.clone());
		Ok(())
	}

	fn remove_side_block(&self, number: u64, hash: &str) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.side.remove(&(number, hash.to_owned()));
		Ok(())
	}

	fn set_side_block_wrong(&self, number: u64, hash: &str) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		match inner.side.get_mut(&(number, hash.to_owned())) {
			Some(b) => {
				b.wrong = true;
				Ok(())
			}
			None => Err(ErrorKind::StoreErr(format!("no side block {}-{}", number, hash)).into()),
		}
	}

	fn save_parameters(&self, parameters: &str) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.parameters = Some(parameters.to_owned());
		Ok(())
	}

	fn parameters(&self) -> Result<Option<String>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.parameters.clone())
	}

	fn apply_index(&self, number: u64, delta: &IndexDelta) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();

		// validate references before touching anything so a failed
		// application leaves no partial state
		for ch in &delta.member_changes {
			let known = inner.identities.contains_key(&ch.pubkey)
				|| delta.identities.iter().any(|i| i.pubkey == ch.pubkey);
			if !known {
				return Err(
					ErrorKind::StoreErr(format!("unknown identity {}", ch.pubkey)).into(),
				);
			}
		}
		for pubkey in &delta.revocations {
			let known = inner.identities.contains_key(pubkey)
				|| delta.identities.iter().any(|i| &i.pubkey == pubkey);
			if !known {
				return Err(ErrorKind::StoreErr(format!("unknown identity {}", pubkey)).into());
			}
		}
		for id in &delta.consumed_sources {
			match inner.sources.iter().find(|s| &s.id() == id) {
				Some(src) if !src.consumed => (),
				Some(_) => {
					return Err(ErrorKind::StoreErr(format!("source {} already spent", id)).into());
				}
				None => {
					return Err(ErrorKind::StoreErr(format!("unknown source {}", id)).into());
				}
			}
		}

		let mut undo = inner.undo.remove(&number).unwrap_or_default();

		for idty in &delta.identities {
			inner.capture_identity(&mut undo, &idty.pubkey);
			inner.identities.insert(idty.pubkey.clone(), idty.clone());
		}
		for ch in &delta.member_changes {
			inner.capture_identity(&mut undo, &ch.pubkey);
			let idty = inner.identities.get_mut(&ch.pubkey).unwrap();
			idty.member = ch.member;
			if ch.member {
				idty.was_member = true;
			}
			idty.ms_number = ch.ms_number;
		}
		for pubkey in &delta.revocations {
			inner.capture_identity(&mut undo, pubkey);
			inner.identities.get_mut(pubkey).unwrap().revoked = true;
		}
		for ms in &delta.memberships {
			inner.memberships.push(ms.clone());
		}
		for cert in &delta.certifications {
			inner.certs.push(cert.clone());
		}
		for link in &delta.links {
			inner.links.push(link.clone());
		}
		for source in &delta.sources {
			inner.sources.push(source.clone());
		}
		for id in &delta.consumed_sources {
			inner.capture_source(&mut undo, id);
			let src = inner.sources.iter_mut().find(|s| &s.id() == id).unwrap();
			src.consumed = true;
			src.consumed_on = Some(number);
		}
		for cert in &delta.expired_certs {
			if let Some(row) = inner.certs.iter_mut().find(|c| {
				!c.expired
					&& c.from == cert.from
					&& c.to == cert.to
					&& c.block_number == cert.block_number
			}) {
				undo.certs.push(row.clone());
				row.expired = true;
			}
		}
		for ms in &delta.expired_memberships {
			if let Some(row) = inner
				.memberships
				.iter_mut()
				.find(|m| !m.expired && m.issuer == ms.issuer && m.number == ms.number)
			{
				undo.memberships.push(row.clone());
				row.expired = true;
			}
		}
		for link in &delta.obsolete_links {
			if let Some(row) = inner.links.iter_mut().find(|l| {
				!l.obsolete
					&& l.source == link.source
					&& l.target == link.target
					&& l.timestamp == link.timestamp
			}) {
				undo.links.push(row.clone());
				row.obsolete = true;
			}
		}

		inner.undo.insert(number, undo);
		Ok(())
	}

	fn revert_index(&self, number: u64) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		let undo = inner.undo.remove(&number).unwrap_or_default();

		inner.memberships.retain(|m| m.written_on != number);
		inner.certs.retain(|c| c.written_on != number);
		inner.links.retain(|l| l.written_on != number);
		inner.sources.retain(|s| s.number != number);

		for (pubkey, image) in undo.identities {
			match image {
				Some(idty) => {
					inner.identities.insert(pubkey, idty);
				}
				None => {
					inner.identities.remove(&pubkey);
				}
			}
		}
		for (id, image) in undo.sources {
			if let Some(row) = inner.sources.iter_mut().find(|s| s.id() == id) {
				*row = image;
			}
		}
		for image in undo.certs {
			if let Some(row) = inner.certs.iter_mut().find(|c| {
				c.from == image.from && c.to == image.to && c.block_number == image.block_number
			}) {
				*row = image;
			}
		}
		for image in undo.memberships {
			if let Some(row) = inner
				.memberships
				.iter_mut()
				.find(|m| m.issuer == image.issuer && m.number == image.number)
			{
				*row = image;
			}
		}
		for image in undo.links {
			if let Some(row) = inner.links.iter_mut().find(|l| {
				l.source == image.source
					&& l.target == image.target
					&& l.timestamp == image.timestamp
			}) {
				*row = image;
			}
		}
		Ok(())
	}

	fn identity(&self, pubkey: &str) -> Result<Option<Identity>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.identities.get(pubkey).cloned())
	}

	fn members(&self) -> Result<Vec<Identity>, Error> {
		let inner = self.inner.read().unwrap();
		let mut members: Vec<Identity> =
			inner.identities.values().filter(|i| i.member).cloned().collect();
		members.sort_by(|a, b| a.pubkey.cmp(&b.pubkey));
		Ok(members)
	}

	fn is_member(&self, pubkey: &str) -> Result<bool, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.identities.get(pubkey).map(|i| i.member).unwrap_or(false))
	}

	fn valid_links(&self) -> Result<Vec<Link>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.links.iter().filter(|l| !l.obsolete).cloned().collect())
	}

	fn valid_links_to(&self, pubkey: &str) -> Result<Vec<Link>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.links
			.iter()
			.filter(|l| !l.obsolete && l.target == pubkey)
			.cloned()
			.collect())
	}

	fn valid_certs_to(&self, pubkey: &str) -> Result<Vec<Certification>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.certs
			.iter()
			.filter(|c| !c.expired && c.to == pubkey)
			.cloned()
			.collect())
	}

	fn last_join_of(&self, pubkey: &str) -> Result<Option<Membership>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.memberships
			.iter()
			.filter(|m| m.kind == MembershipKind::Join && m.issuer == pubkey)
			.max_by_key(|m| m.written_on)
			.cloned())
	}

	fn certs_older_than(&self, max_ts: i64) -> Result<Vec<Certification>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.certs
			.iter()
			.filter(|c| !c.expired && c.timestamp <= max_ts)
			.cloned()
			.collect())
	}

	fn memberships_older_than(&self, max_ts: i64) -> Result<Vec<Membership>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.memberships
			.iter()
			.filter(|m| !m.expired && m.median_time <= max_ts)
			.cloned()
			.collect())
	}

	fn links_older_than(&self, max_ts: i64) -> Result<Vec<Link>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.links
			.iter()
			.filter(|l| !l.obsolete && l.timestamp <= max_ts)
			.cloned()
			.collect())
	}

	fn certification_excluding_block(&self, sig_validity: i64) -> Result<Block, Error> {
		let inner = self.inner.read().unwrap();
		let head = inner
			.chain
			.last()
			.ok_or_else(|| Error::from(ErrorKind::BlockNotFound(0)))?;
		let horizon = head.median_time - sig_validity;
		inner
			.chain
			.iter()
			.rev()
			.find(|b| b.median_time <= horizon)
			.cloned()
			.ok_or_else(|| ErrorKind::BlockNotFound(0).into())
	}

	fn sources_of(&self, pubkey: &str) -> Result<Vec<Source>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.sources
			.iter()
			.filter(|s| s.pubkey == pubkey)
			.cloned()
			.collect())
	}

	fn push_stat(&self, stat: Stat, number: u64) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		let record = inner.stats.entry(stat.name()).or_insert_with(StatRecord::default);
		if !record.blocks.contains(&number) {
			record.blocks.push(number);
		}
		if number > record.last_parsed {
			record.last_parsed = number;
		}
		Ok(())
	}

	fn stat_blocks(&self, stat: Stat) -> Result<Vec<u64>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner
			.stats
			.get(stat.name())
			.map(|r| r.blocks.clone())
			.unwrap_or_default())
	}

	fn migrate_old_blocks(&self) -> Result<u64, Error> {
		let mut inner = self.inner.write().unwrap();
		let head_number = match inner.chain.last() {
			Some(h) => h.number,
			None => return Ok(0),
		};
		let horizon = head_number.saturating_sub(HOT_WINDOW);
		let before = inner.side.len() + inner.undo.len();
		inner.side.retain(|&(number, _), _| number >= horizon);
		inner.undo.retain(|&number, _| number >= horizon);
		Ok((before - inner.side.len() - inner.undo.len()) as u64)
	}
}

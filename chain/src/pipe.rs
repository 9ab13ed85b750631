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

//! Implementation of the chain block acceptance (or refusal) pipeline:
//! validating a block against the head, applying it and every index it
//! materializes, and reverting the head exactly.

use std::collections::BTreeSet;

use crate::core::block::Block;
use crate::core::consensus;
use crate::core::tx::{Source, SourceKind};
use crate::core::wot::{Link, MembershipKind};
use crate::error::{Error, ErrorKind};
use crate::types::{ChainConfig, ChainStore, IndexDelta, MemberChange, Options, Rules};

/// Contextual information required to process a new block and either
/// reject or accept it.
pub struct BlockContext<'a> {
	/// The options
	pub opts: Options,
	/// The storage the chain materializes into.
	pub store: &'a dyn ChainStore,
	/// The rule set blocks are validated against.
	pub rules: &'a dyn Rules,
	/// Chain configuration.
	pub conf: &'a ChainConfig,
}

/// Validate a block against the rule set, to the depth selected by the
/// context options.
pub fn check_block(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	ctx.rules.check_block(b, ctx.opts, ctx.store, ctx.conf)
}

/// Apply a block as the new canonical head. The block must extend the
/// current head (or be the root of an empty chain); every materialized
/// index is updated in one journaled unit so the application can be
/// reverted exactly. Returns the block enriched with its derived fields.
pub fn apply_block(b: &Block, ctx: &BlockContext<'_>) -> Result<Block, Error> {
	let head = ctx.store.head()?;
	match head {
		Some(ref h) => {
			if b.number != h.number + 1 || b.previous_hash != h.hash {
				return Err(ErrorKind::InvalidBlock(format!(
					"block {} does not extend head {}",
					b.stamp(),
					h.stamp()
				))
				.into());
			}
		}
		None => {
			if b.number != 0 {
				return Err(ErrorKind::InvalidBlock(format!(
					"block {} cannot start an empty chain",
					b.stamp()
				))
				.into());
			}
		}
	}

	if b.number == 0 {
		save_parameters_for_root_block(b, ctx)?;
	}

	let enriched = enrich(b, head.as_ref(), ctx.conf);
	let store = ctx.store;
	let delta = index_delta(&enriched, store, ctx.conf, &|n| store.get_block_or_null(n))?;
	store.apply_index(enriched.number, &delta)?;
	store.append_block(&enriched)?;
	// the block may have been known as a side block before; it is
	// canonical now
	store.remove_side_block(enriched.number, &enriched.hash)?;
	debug!("applied block {} as the new head", enriched.stamp());
	Ok(enriched)
}

/// Record a block that does not extend the head on its side chain.
pub fn apply_side_block(b: &Block, ctx: &BlockContext<'_>) -> Result<Block, Error> {
	let mut side = b.clone();
	side.fork = true;
	ctx.store.save_side_block(&side)?;
	debug!("registered side block {}", side.stamp());
	Ok(side)
}

/// Undo the canonical head: reverse its index mutations, pop it off the
/// chain and keep it around as a side block so it stays reachable for a
/// later switch back.
pub fn revert_block(ctx: &BlockContext<'_>) -> Result<Block, Error> {
	let head = ctx
		.store
		.head()?
		.ok_or_else(|| Error::from(ErrorKind::Other("no block to revert".to_owned())))?;
	if head.number == 0 {
		return Err(ErrorKind::Other("cannot revert the root block".to_owned()).into());
	}
	ctx.store.revert_index(head.number)?;
	let popped = ctx.store.pop_block()?;
	let mut side = popped.clone();
	side.fork = true;
	side.wrong = false;
	ctx.store.save_side_block(&side)?;
	debug!("reverted block {}", popped.stamp());
	Ok(popped)
}

/// Persist the currency parameters carried by a root block.
pub fn save_parameters_for_root_block(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	match b.parameters {
		Some(ref params) => ctx.store.save_parameters(params),
		None => {
			Err(ErrorKind::InvalidBlock("root block carries no parameters".to_owned()).into())
		}
	}
}

/// Expire certifications, memberships and links aged past their validity
/// windows as of the given canonical block.
pub fn obsolete_in_main_branch(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let mut delta = IndexDelta::default();
	expirations(b, ctx.store, ctx.conf, &mut delta)?;
	if delta.is_empty() {
		return Ok(());
	}
	ctx.store.apply_index(b.number, &delta)
}

/// Assign the fields a block only gains once inserted into the main
/// chain: the monetary mass and dividend clock recurrences, and the
/// canonical markers.
pub fn enrich(b: &Block, prev: Option<&Block>, conf: &ChainConfig) -> Block {
	let mut e = b.clone();
	e.fork = false;
	e.wrong = false;
	match prev {
		Some(p) => {
			e.monetary_mass = consensus::monetary_mass(p.monetary_mass, e.dividend, e.members_count);
			e.ud_time = consensus::ud_time(p.ud_time, e.dividend, conf.dt);
		}
		None => {
			e.monetary_mass = consensus::monetary_mass(0, e.dividend, e.members_count);
			e.ud_time = e.median_time;
		}
	}
	e
}

/// Every index mutation the given block entails. `resolve` maps a block
/// number to the block it designates; bulk application passes a resolver
/// that prefers its in-memory segment over the store.
pub fn index_delta(
	b: &Block,
	store: &dyn ChainStore,
	conf: &ChainConfig,
	resolve: &dyn Fn(u64) -> Result<Option<Block>, Error>,
) -> Result<IndexDelta, Error> {
	let mut delta = IndexDelta::default();

	for idty in &b.identities {
		let mut row = idty.clone();
		row.member = false;
		row.revoked = false;
		row.ms_number = -1;
		row.written_on = b.number;
		delta.identities.push(row);
	}

	for (list, kind) in &[
		(&b.joiners, MembershipKind::Join),
		(&b.actives, MembershipKind::Active),
		(&b.leavers, MembershipKind::Leave),
	] {
		for ms in list.iter() {
			let mut row = ms.clone();
			row.kind = *kind;
			row.median_time = b.median_time;
			row.written_on = b.number;
			row.expired = false;
			delta.memberships.push(row);
			delta.member_changes.push(MemberChange {
				pubkey: ms.issuer.clone(),
				member: true,
				ms_number: ms.number as i64,
			});
		}
	}

	for rev in &b.revoked {
		delta.revocations.push(rev.pubkey.clone());
	}

	for pubkey in &b.excluded {
		let ms_number = store
			.identity(pubkey)?
			.map(|i| i.ms_number)
			.unwrap_or(-1);
		delta.member_changes.push(MemberChange {
			pubkey: pubkey.clone(),
			member: false,
			ms_number,
		});
	}

	for cert in &b.certifications {
		// a certification may be anchored at its own enclosing block
		let origin = if cert.block_number == b.number {
			Some(b.clone())
		} else {
			resolve(cert.block_number)?
		};
		let origin = origin.ok_or_else(|| {
			Error::from(ErrorKind::InvalidBlock(format!(
				"certification {} -> {} refers to unknown block {}",
				cert.from, cert.to, cert.block_number
			)))
		})?;
		let mut row = cert.clone();
		row.timestamp = origin.median_time;
		row.written_on = b.number;
		row.expired = false;
		delta.certifications.push(row);
		delta.links.push(Link {
			source: cert.from.clone(),
			target: cert.to.clone(),
			timestamp: b.median_time,
			written_on: b.number,
			obsolete: false,
		});
	}

	for tx in &b.transactions {
		for input in &tx.inputs {
			delta.consumed_sources.push(input.source_id());
		}
		for (index, output) in tx.outputs.iter().enumerate() {
			delta.sources.push(Source {
				kind: SourceKind::T,
				pubkey: output.pubkey.clone(),
				number: b.number,
				fingerprint: format!("{}-{}", tx.hash, index),
				amount: output.amount,
				base: output.base,
				conditions: format!("SIG({})", output.pubkey),
				consumed: false,
				consumed_on: None,
			});
		}
	}

	if let Some(ud) = b.dividend {
		for pubkey in members_after(b, store)? {
			delta.sources.push(Source {
				kind: SourceKind::D,
				pubkey: pubkey.clone(),
				number: b.number,
				fingerprint: pubkey.clone(),
				amount: ud,
				base: b.unit_base,
				conditions: format!("SIG({})", pubkey),
				consumed: false,
				consumed_on: None,
			});
		}
	}

	expirations(b, store, conf, &mut delta)?;
	Ok(delta)
}

// The members set once the block's own membership changes are in: the
// dividend pays them, not the set as of the previous block.
fn members_after(b: &Block, store: &dyn ChainStore) -> Result<Vec<String>, Error> {
	let mut members: BTreeSet<String> =
		store.members()?.into_iter().map(|i| i.pubkey).collect();
	for ms in b.joiners.iter().chain(&b.actives) {
		members.insert(ms.issuer.clone());
	}
	for pubkey in &b.excluded {
		members.remove(pubkey);
	}
	Ok(members.into_iter().collect())
}

fn expirations(
	b: &Block,
	store: &dyn ChainStore,
	conf: &ChainConfig,
	delta: &mut IndexDelta,
) -> Result<(), Error> {
	delta
		.expired_certs
		.extend(store.certs_older_than(b.median_time - conf.sig_validity)?);
	delta
		.expired_memberships
		.extend(store.memberships_older_than(b.median_time - conf.ms_validity)?);
	delta
		.obsolete_links
		.extend(store.links_older_than(b.median_time - conf.sig_validity)?);
	Ok(())
}

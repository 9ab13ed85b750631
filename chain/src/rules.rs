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

//! The standard implementation of the consensus rule set seam: content
//! integrity, proof-of-work and the web-of-trust distance predicate. The
//! full semantic rule set (document eligibility, source balances) lives
//! with the document pools and is out of this crate's hands.

use std::collections::{HashMap, HashSet};

use crate::core::block::Block;
use crate::core::consensus;
use crate::core::wot::Link;
use crate::error::{Error, ErrorKind};
use crate::types::{ChainConfig, ChainStore, Options, Rules};

/// How many recent blocks weigh into an issuer's personalized difficulty.
const TRIAL_FRAME: u64 = 5;

/// Maximum number of hops between a member and an identity for the web
/// of trust to be considered stable around it.
const MAX_HOPS: usize = 3;

/// Content-integrity and proof-of-work rule set.
pub struct StandardRules;

impl Rules for StandardRules {
	fn check_block(
		&self,
		block: &Block,
		opts: Options,
		store: &dyn ChainStore,
		conf: &ChainConfig,
	) -> Result<(), Error> {
		// cheap structural checks first
		if block.currency != conf.currency {
			return Err(ErrorKind::InvalidBlock(format!(
				"wrong currency {}",
				block.currency
			))
			.into());
		}
		if block.number > 0 && block.previous_hash.is_empty() {
			return Err(ErrorKind::InvalidBlock("missing previous hash".to_owned()).into());
		}
		if block.number == 0 && block.parameters.is_none() {
			return Err(
				ErrorKind::InvalidBlock("root block carries no parameters".to_owned()).into(),
			);
		}
		if block.hash != block.compute_hash() {
			return Err(ErrorKind::InvalidBlock("hash does not match content".to_owned()).into());
		}

		if !opts.contains(Options::SKIP_POW) {
			if block.signature.is_empty() {
				return Err(ErrorKind::InvalidBlock("missing signature".to_owned()).into());
			}
			if !consensus::valid_pow(&block.hash, block.pow_min) {
				return Err(ErrorKind::InvalidBlock(format!(
					"insufficient proof-of-work for level {}",
					block.pow_min
				))
				.into());
			}
			if block.number > 0 && !store.is_member(&block.issuer)? {
				return Err(ErrorKind::InvalidBlock(format!(
					"issuer {} is not a member",
					block.issuer
				))
				.into());
			}
		}
		Ok(())
	}

	fn trial_level(
		&self,
		pubkey: &str,
		_conf: &ChainConfig,
		store: &dyn ChainStore,
	) -> Result<u32, Error> {
		let head = match store.head()? {
			Some(h) => h,
			None => return Ok(0),
		};
		// one extra level per recent block of our own keeps issuance
		// rotating between members
		let from = head.number.saturating_sub(TRIAL_FRAME - 1);
		let frame = store.blocks_between(from, head.number - from + 1)?;
		let own = frame.iter().filter(|b| b.issuer == pubkey).count() as u32;
		Ok(head.pow_min + own)
	}

	fn is_over_3_hops(
		&self,
		pubkey: &str,
		links: &[Link],
		newcomers: &[String],
		current: Option<&Block>,
		_conf: &ChainConfig,
		store: &dyn ChainStore,
	) -> Result<bool, Error> {
		if current.is_none() {
			// the root block seeds the web, nobody is outdistanced yet
			return Ok(false);
		}

		// walk certifier chains backward from the identity: reached keys
		// are those with a path to it of at most MAX_HOPS links
		let mut certifiers: HashMap<String, Vec<String>> = HashMap::new();
		for link in store.valid_links()?.iter().chain(links) {
			certifiers
				.entry(link.target.clone())
				.or_insert_with(Vec::new)
				.push(link.source.clone());
		}

		let mut reached: HashSet<String> = HashSet::new();
		reached.insert(pubkey.to_owned());
		let mut frontier: Vec<String> = vec![pubkey.to_owned()];
		for _ in 0..MAX_HOPS {
			let mut next: Vec<String> = vec![];
			for target in frontier {
				if let Some(sources) = certifiers.get(&target) {
					for source in sources {
						if reached.insert(source.clone()) {
							next.push(source.clone());
						}
					}
				}
			}
			frontier = next;
		}

		let outdistanced = store
			.members()?
			.iter()
			.filter(|m| !newcomers.contains(&m.pubkey))
			.any(|m| !reached.contains(&m.pubkey));
		Ok(outdistanced)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::store::MemStore;
	use crate::types::IndexDelta;
	use crate::core::wot::Identity;

	fn member(pubkey: &str) -> Identity {
		let mut idty = Identity::new(pubkey, pubkey, "0-G", "SIG");
		idty.member = true;
		idty.was_member = true;
		idty
	}

	fn link(source: &str, target: &str) -> Link {
		Link {
			source: source.to_owned(),
			target: target.to_owned(),
			timestamp: 0,
			written_on: 0,
			obsolete: false,
		}
	}

	#[test]
	fn distance_rule_follows_certifier_chains() {
		let store = MemStore::new();
		let mut delta = IndexDelta::default();
		for pk in &["A", "B", "C", "D"] {
			delta.identities.push(member(pk));
		}
		// A -> B -> C -> D, so A sits three hops from D
		delta.links.push(link("A", "B"));
		delta.links.push(link("B", "C"));
		delta.links.push(link("C", "D"));
		store.apply_index(0, &delta).unwrap();

		let rules = StandardRules;
		let conf = ChainConfig::default();
		let head = Block::empty(3, "");

		assert!(!rules
			.is_over_3_hops("D", &[], &[], Some(&head), &conf, &store)
			.unwrap());
		// E joins certified by D only: A is now four hops away
		let provisional = vec![link("D", "E")];
		assert!(rules
			.is_over_3_hops("E", &provisional, &["E".to_owned()], Some(&head), &conf, &store)
			.unwrap());
		// a direct certification from A fixes it
		let provisional = vec![link("D", "E"), link("A", "E")];
		assert!(!rules
			.is_over_3_hops("E", &provisional, &["E".to_owned()], Some(&head), &conf, &store)
			.unwrap());
	}
}

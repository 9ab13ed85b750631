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

//! A process to periodically migrate old blocks out of the hot working
//! set. One migration runs at a time; failures are logged and the
//! schedule carries on.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::consensus::MEMORY_CLEAN_INTERVAL;
use crate::types::ChainStore;

/// Shared stop flag for a background monitor thread, wakeable so the
/// monitor ends promptly instead of at its next tick.
pub struct StopState {
	stopped: Mutex<bool>,
	cond: Condvar,
}

impl StopState {
	/// A running (not stopped) state.
	pub fn new() -> StopState {
		StopState {
			stopped: Mutex::new(false),
			cond: Condvar::new(),
		}
	}

	/// Ask the monitor to stop and wake it up.
	pub fn stop(&self) {
		let mut stopped = self.stopped.lock().unwrap();
		*stopped = true;
		self.cond.notify_all();
	}

	/// Whether a stop was requested.
	pub fn is_stopped(&self) -> bool {
		*self.stopped.lock().unwrap()
	}

	/// Sleep for the given duration, cut short by a stop request.
	/// Returns whether a stop was requested.
	pub fn wait_for(&self, duration: Duration) -> bool {
		let guard = self.stopped.lock().unwrap();
		if *guard {
			return true;
		}
		let (guard, _) = self.cond.wait_timeout(guard, duration).unwrap();
		*guard
	}
}

impl Default for StopState {
	fn default() -> StopState {
		StopState::new()
	}
}

/// Start the periodic migration monitor. Every `MEMORY_CLEAN_INTERVAL`
/// seconds one `migrate_old_blocks` run is performed on the store; the
/// thread serializes the runs so at most one is ever in flight.
pub fn run_clean_memory(store: Arc<dyn ChainStore>, stop_state: Arc<StopState>) {
	debug!("started old-block migration monitor");

	let _ = thread::Builder::new()
		.name("cleaner".to_string())
		.spawn(move || loop {
			if stop_state.wait_for(Duration::from_secs(MEMORY_CLEAN_INTERVAL)) {
				debug!("old-block migration monitor stopped");
				break;
			}
			match store.migrate_old_blocks() {
				Ok(moved) if moved > 0 => {
					debug!("clean_mem: migrated {} old records", moved)
				}
				Ok(_) => (),
				Err(e) => error!("clean_mem: problem migrating old blocks: {}", e),
			}
		});
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn stop_state_wakes_waiters() {
		let stop = Arc::new(StopState::new());
		let waiter = stop.clone();
		let handle = thread::spawn(move || waiter.wait_for(Duration::from_secs(3600)));
		thread::sleep(Duration::from_millis(50));
		stop.stop();
		assert!(handle.join().unwrap());
		assert!(stop.is_stopped());
	}
}

// Weft
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Generic-instantiation propagation engine
//!
//! Weaving decisions are expressed against generic definitions or patterns,
//! but only constructed instantiations are ever invoked. This engine bridges
//! the gap: every instantiation event links the new unit into the directory
//! (replaying the definition's current aspects) and offers it to the
//! standing weavers registered at that moment.
//!
//! Registration and instantiation are serialized by a two-phase protocol on
//! the weaver list's lock: a registering thread replays the constructed-unit
//! log under an upgradable read lock, upgrades to exclude in-flight
//! instantiations, replays whatever raced in, and only then publishes the
//! weaver. An instantiation holds the read lock across both its weaver sweep
//! and its log append, so every unit is matched exactly once. Concurrent
//! registrations queue behind a registration lock; only a registration
//! re-entered from this thread's own replay or sweep is rejected.
//! Unregistration is a tombstone on the weaver, which also works from advice
//! running inside a sweep that holds the list read locked.

use crate::directory::Directory;
use crate::directory::entry::{NO_OWNER, thread_token};
use crate::errors::WeaveError;
use crate::weaver::StandingWeaver;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use weft_common::aspect::AspectId;
use weft_common::identity::UnitInfo;

/// Tracks constructed generic units and the standing weavers that want to
/// hear about them.
pub struct GenericEngine {
    directory: Arc<Directory>,
    /// Standing weavers with closed-instantiation propagation enabled.
    weavers: RwLock<Vec<Arc<StandingWeaver>>>,
    /// Every constructed unit seen, in creation order.
    constructed: Mutex<Vec<UnitInfo>>,
    /// Serializes standing-weaver registrations.
    registration: Mutex<()>,
    /// Thread token of the registration currently in flight.
    registering: AtomicU64,
    /// Thread token of the instantiation sweep currently in flight.
    sweeping: AtomicU64,
}

impl GenericEngine {
    pub fn new(directory: Arc<Directory>) -> Self {
        GenericEngine {
            directory,
            weavers: RwLock::new(Vec::new()),
            constructed: Mutex::new(Vec::new()),
            registration: Mutex::new(()),
            registering: AtomicU64::new(NO_OWNER),
            sweeping: AtomicU64::new(NO_OWNER),
        }
    }

    /// Handle a newly reachable generic instantiation: create and link its
    /// entry (replaying the definition's aspects), then offer it to every
    /// registered standing weaver.
    pub fn instantiation_created(&self, unit: UnitInfo) -> Result<(), WeaveError> {
        debug!(unit = %unit.id, "instantiation created");
        self.directory.obtain(&unit)?;

        // The read lock is held across the sweep and the log append: a
        // weaver registered concurrently either sees this unit in the log or
        // its publication is ordered after this sweep, never neither.
        let weavers = self.weavers.read_recursive();
        let previous = self.sweeping.swap(thread_token(), Ordering::AcqRel);
        let swept = weavers.iter().try_for_each(|weaver| weaver.offer(&unit, &self.directory));
        self.sweeping.store(previous, Ordering::Release);
        swept?;
        self.constructed.lock().push(unit);
        Ok(())
    }

    /// Register a standing weaver: replay all instantiations seen so far,
    /// then publish it for live matching. Concurrent registrations wait
    /// their turn; only a registration attempted from inside this thread's
    /// own replay or instantiation sweep fails fast.
    pub fn register_standing(&self, weaver: Arc<StandingWeaver>) -> Result<(), WeaveError> {
        let token = thread_token();
        if self.registering.load(Ordering::Acquire) == token || self.sweeping.load(Ordering::Acquire) == token {
            return Err(WeaveError::RecursiveStandingWeaver);
        }
        let _serial = self.registration.lock();
        self.registering.store(token, Ordering::Release);
        let result = self.register_inner(&weaver);
        self.registering.store(NO_OWNER, Ordering::Release);
        if result.is_ok() {
            info!(aspect = %weaver.aspect_id(), "standing weaver registered");
        }
        result
    }

    fn register_inner(&self, weaver: &Arc<StandingWeaver>) -> Result<(), WeaveError> {
        let guard = self.weavers.upgradable_read();
        let index = self.replay(weaver, 0)?;

        // Upgrading waits out in-flight instantiations, so the tail replay
        // below sees everything created before the weaver goes live.
        let mut weavers = RwLockUpgradableReadGuard::upgrade(guard);
        self.replay(weaver, index)?;
        weavers.retain(|existing| !existing.is_retired());
        weavers.push(weaver.clone());
        Ok(())
    }

    /// Offer logged units starting at `from`; returns the next index.
    fn replay(&self, weaver: &StandingWeaver, from: usize) -> Result<usize, WeaveError> {
        let mut index = from;
        loop {
            let unit = {
                let log = self.constructed.lock();
                log.get(index).cloned()
            };
            match unit {
                Some(unit) => {
                    weaver.offer(&unit, &self.directory)?;
                    index += 1;
                }
                None => return Ok(index),
            }
        }
    }

    /// Retire the standing weaver for `aspect`; future instantiations stop
    /// being auto-matched. Units already woven are unaffected. Retirement
    /// is a tombstone, so the call also works from advice running inside an
    /// instantiation sweep, where this thread already holds the weaver list
    /// for reading.
    pub fn unregister_standing(&self, aspect: AspectId) {
        let mut retired = false;
        for weaver in self.weavers.read_recursive().iter() {
            if weaver.aspect_id() == aspect && !weaver.is_retired() {
                weaver.retire();
                retired = true;
            }
        }
        if retired {
            info!(aspect = %aspect, "standing weaver unregistered");
        }
        // Prune when the list is free; a sweep on this thread keeps it read
        // locked, in which case tombstones are dropped at the next
        // registration instead.
        if let Some(mut weavers) = self.weavers.try_write() {
            weavers.retain(|weaver| !weaver.is_retired());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ChainInstaller, UnitCatalog};
    use crate::weaver::WeaveFlags;
    use weft_common::advice::Advice;
    use weft_common::aspect::Aspect;
    use weft_common::identity::{Signature, UnitId};

    struct NullInstaller;

    impl ChainInstaller for NullInstaller {
        fn supports(&self, _unit: &UnitInfo) -> bool {
            true
        }

        fn install(&self, _unit: &UnitInfo, _chain: &[Advice]) -> Result<(), WeaveError> {
            Ok(())
        }
    }

    struct EmptyCatalog;

    impl UnitCatalog for EmptyCatalog {
        fn loaded_units(&self) -> Vec<UnitInfo> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct Marker;

    impl Aspect for Marker {
        fn advise(&self, _unit: &UnitInfo) -> Vec<Advice> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct OtherMarker;

    impl Aspect for OtherMarker {
        fn advise(&self, _unit: &UnitInfo) -> Vec<Advice> {
            Vec::new()
        }
    }

    fn engine() -> (Arc<Directory>, GenericEngine) {
        let directory = Arc::new(Directory::new(Arc::new(NullInstaller), Arc::new(EmptyCatalog)));
        let engine = GenericEngine::new(directory.clone());
        (directory, engine)
    }

    fn push_definition() -> UnitInfo {
        UnitInfo::definition(UnitId::method("Stack", "push", Signature::new(["T"])).with_generic_arity(1))
    }

    fn push_instance(argument: &str) -> UnitInfo {
        UnitInfo::instance_of(
            UnitId::method("Stack", "push", Signature::new([argument])),
            push_definition(),
            [argument],
        )
    }

    fn standing(directory: &Directory) -> Arc<StandingWeaver> {
        let (id, aspect) = directory.singleton::<Marker>();
        Arc::new(StandingWeaver::new(
            id,
            aspect,
            Arc::new(|unit: &UnitInfo| unit.id.name == "push"),
            WeaveFlags::CLOSED,
        ))
    }

    #[test]
    fn test_instantiation_inherits_definition_aspects() {
        let (directory, engine) = engine();
        directory.add::<Marker>(&push_definition()).unwrap();

        engine.instantiation_created(push_instance("i32")).unwrap();
        let entry = directory.obtain(&push_instance("i32")).unwrap();
        assert!(entry.has_aspect(AspectId::of::<Marker>()));
    }

    #[test]
    fn test_standing_weaver_covers_future_instantiations() {
        let (directory, engine) = engine();
        engine.register_standing(standing(&directory)).unwrap();

        engine.instantiation_created(push_instance("i32")).unwrap();
        assert_eq!(directory.index_of(AspectId::of::<Marker>()).len(), 1);
    }

    #[test]
    fn test_registration_replays_earlier_instantiations() {
        let (directory, engine) = engine();
        engine.instantiation_created(push_instance("i32")).unwrap();
        engine.instantiation_created(push_instance("i64")).unwrap();

        engine.register_standing(standing(&directory)).unwrap();
        assert_eq!(directory.index_of(AspectId::of::<Marker>()).len(), 2);
    }

    #[test]
    fn test_unregister_stops_future_matching() {
        let (directory, engine) = engine();
        engine.register_standing(standing(&directory)).unwrap();
        engine.instantiation_created(push_instance("i32")).unwrap();

        engine.unregister_standing(AspectId::of::<Marker>());
        engine.instantiation_created(push_instance("i64")).unwrap();

        // The earlier weave survives; the later instantiation is unmatched.
        let woven = directory.index_of(AspectId::of::<Marker>());
        assert_eq!(woven.len(), 1);
        assert_eq!(woven[0].signature.parameters(), ["i32"]);
    }

    #[test]
    fn test_concurrent_registrations_wait_instead_of_failing() {
        use std::sync::atomic::AtomicBool;
        use std::thread;
        use std::time::Duration;

        let (directory, engine) = engine();
        engine.instantiation_created(push_instance("i32")).unwrap();

        // The first registration parks inside its replay until released.
        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let in_pattern = entered.clone();
        let hold = release.clone();
        let (slow_id, slow_aspect) = directory.singleton::<Marker>();
        let slow = Arc::new(StandingWeaver::new(
            slow_id,
            slow_aspect,
            Arc::new(move |_unit: &UnitInfo| {
                in_pattern.store(true, Ordering::SeqCst);
                while !hold.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
                true
            }),
            WeaveFlags::CLOSED,
        ));

        let (fast_id, fast_aspect) = directory.singleton::<OtherMarker>();
        let fast = Arc::new(StandingWeaver::new(
            fast_id,
            fast_aspect,
            Arc::new(|unit: &UnitInfo| unit.id.name == "push"),
            WeaveFlags::CLOSED,
        ));

        thread::scope(|scope| {
            let engine_ref = &engine;
            let first = scope.spawn(move || engine_ref.register_standing(slow));
            while !entered.load(Ordering::SeqCst) {
                thread::yield_now();
            }
            let second = scope.spawn(move || engine_ref.register_standing(fast));
            thread::sleep(Duration::from_millis(20));
            release.store(true, Ordering::SeqCst);

            first.join().unwrap().unwrap();
            second.join().unwrap().unwrap();
        });

        assert_eq!(directory.index_of(AspectId::of::<Marker>()).len(), 1);
        assert_eq!(directory.index_of(AspectId::of::<OtherMarker>()).len(), 1);
    }

    #[test]
    fn test_registration_from_replay_is_rejected() {
        let (directory, engine) = engine();
        let engine = Arc::new(engine);
        engine.instantiation_created(push_instance("i32")).unwrap();

        let inner = standing(&directory);
        let observed: Arc<Mutex<Option<WeaveError>>> = Arc::new(Mutex::new(None));
        let seen = observed.clone();
        let nested = engine.clone();
        let (id, aspect) = directory.singleton::<OtherMarker>();
        let outer = Arc::new(StandingWeaver::new(
            id,
            aspect,
            Arc::new(move |_unit: &UnitInfo| {
                *seen.lock() = nested.register_standing(inner.clone()).err();
                false
            }),
            WeaveFlags::CLOSED,
        ));

        engine.register_standing(outer).unwrap();
        assert!(matches!(observed.lock().take(), Some(WeaveError::RecursiveStandingWeaver)));
    }

    /// Aspect that retires its own standing weaver from inside advise.
    struct SelfRetiring {
        engine: Arc<GenericEngine>,
    }

    impl Aspect for SelfRetiring {
        fn advise(&self, _unit: &UnitInfo) -> Vec<Advice> {
            self.engine.unregister_standing(AspectId::of::<SelfRetiring>());
            Vec::new()
        }
    }

    #[test]
    fn test_unregister_from_inside_a_sweep_completes() {
        let directory = Arc::new(Directory::new(Arc::new(NullInstaller), Arc::new(EmptyCatalog)));
        let engine = Arc::new(GenericEngine::new(directory.clone()));

        let aspect: Arc<dyn Aspect> = Arc::new(SelfRetiring { engine: engine.clone() });
        let weaver = Arc::new(StandingWeaver::new(
            AspectId::of::<SelfRetiring>(),
            aspect,
            Arc::new(|unit: &UnitInfo| unit.id.name == "push"),
            WeaveFlags::CLOSED,
        ));
        engine.register_standing(weaver).unwrap();

        // The sweep installs the aspect, whose advise retires the weaver;
        // the call must return rather than block on the weaver list.
        engine.instantiation_created(push_instance("i32")).unwrap();
        assert_eq!(directory.index_of(AspectId::of::<SelfRetiring>()).len(), 1);

        engine.instantiation_created(push_instance("i64")).unwrap();
        assert_eq!(directory.index_of(AspectId::of::<SelfRetiring>()).len(), 1);
    }
}

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

//! Weaving directory
//!
//! The process-wide table mapping callable-unit identity to its [`Entry`].
//! Entries are created once, lazily, on first reference and cached for the
//! life of the process; an entry with zero aspects is equivalent to "not
//! woven" but stays in the table.

pub mod entry;

pub use entry::Entry;

use crate::contracts::{ChainInstaller, UnitCatalog};
use crate::errors::WeaveError;
use dashmap::DashMap;
use entry::{NO_OWNER, thread_token};
use parking_lot::Mutex;
use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use weft_common::aspect::{Aspect, AspectId};
use weft_common::identity::{UnitId, UnitInfo};

/// Identity-to-entry registry with singleton aspect instances.
pub struct Directory {
    entries: DashMap<UnitId, Arc<Entry>>,
    /// One aspect instance per aspect type, materialized lazily.
    singletons: DashMap<TypeId, Arc<dyn Aspect>>,
    installer: Arc<dyn ChainInstaller>,
    catalog: Arc<dyn UnitCatalog>,
    /// Serializes generic-linkage initialization; a concurrent `obtain` of
    /// an entry mid-initialization waits here for the finished view.
    init_lock: Mutex<()>,
    /// Thread token of the initialization currently holding `init_lock`,
    /// letting nested obtains on the same stack join it instead of
    /// deadlocking.
    init_owner: AtomicU64,
}

impl Directory {
    pub fn new(installer: Arc<dyn ChainInstaller>, catalog: Arc<dyn UnitCatalog>) -> Self {
        Directory {
            entries: DashMap::new(),
            singletons: DashMap::new(),
            installer,
            catalog,
            init_lock: Mutex::new(()),
            init_owner: AtomicU64::new(NO_OWNER),
        }
    }

    pub(crate) fn catalog_units(&self) -> Vec<UnitInfo> {
        self.catalog.loaded_units()
    }

    /// The singleton instance of aspect type `A`, created on first use.
    pub(crate) fn singleton<A: Aspect + Default>(&self) -> (AspectId, Arc<dyn Aspect>) {
        let id = AspectId::of::<A>();
        let aspect = self
            .singletons
            .entry(id.type_id())
            .or_insert_with(|| Arc::new(A::default()) as Arc<dyn Aspect>)
            .clone();
        (id, aspect)
    }

    /// Return the cached entry for `unit` or create one, performing any
    /// pending generic-linkage initialization before returning. Creation is
    /// idempotent under concurrent callers.
    pub fn obtain(&self, unit: &UnitInfo) -> Result<Arc<Entry>, WeaveError> {
        let canonical = self.canonicalize(unit);
        let entry = self.obtain_raw(&canonical)?;
        self.initialize(&entry)?;
        Ok(entry)
    }

    /// Resolve an overriding/derived view to its introducing declaration.
    fn canonicalize(&self, unit: &UnitInfo) -> UnitInfo {
        let Some(base) = &unit.base else {
            return unit.clone();
        };
        if let Some(existing) = self.entries.get(base) {
            return existing.unit().clone();
        }
        if let Some(declared) = self.catalog.loaded_units().into_iter().find(|info| &info.id == base) {
            return declared;
        }
        // Introducing declaration is not in the catalog; reuse the derived
        // view's metadata under the canonical identity.
        let mut canonical = unit.clone();
        canonical.id = base.clone();
        canonical.base = None;
        canonical
    }

    fn obtain_raw(&self, unit: &UnitInfo) -> Result<Arc<Entry>, WeaveError> {
        if let Some(existing) = self.entries.get(&unit.id) {
            return Ok(existing.clone());
        }
        // Definitions are never invoked, so only invocable units must be
        // interceptable.
        if !unit.is_definition && !self.installer.supports(unit) {
            return Err(WeaveError::UnsupportedUnit(unit.id.clone()));
        }
        let entry = self
            .entries
            .entry(unit.id.clone())
            .or_insert_with(|| {
                debug!(unit = %unit.id, "entry created");
                Entry::new(unit.clone())
            })
            .clone();
        Ok(entry)
    }

    /// Run generic-linkage initialization once per entry: link an
    /// instantiation to its definition (creating and initializing the
    /// definition entry first), and pull in any already-loaded
    /// instantiations of a definition that raced ahead of weaving. Callers
    /// always return a fully-initialized view; a failed attempt leaves the
    /// entry uninitialized and is retried on the next reference.
    fn initialize(&self, entry: &Arc<Entry>) -> Result<(), WeaveError> {
        if entry.is_initialized() {
            return Ok(());
        }
        let token = thread_token();
        if self.init_owner.load(Ordering::Acquire) == token {
            // Nested obtain from inside this thread's own initialization.
            return self.initialize_locked(entry);
        }
        let _serial = self.init_lock.lock();
        self.init_owner.store(token, Ordering::Release);
        let result = self.initialize_locked(entry);
        self.init_owner.store(NO_OWNER, Ordering::Release);
        result
    }

    fn initialize_locked(&self, entry: &Arc<Entry>) -> Result<(), WeaveError> {
        if entry.is_initialized() || !entry.begin_initialization() {
            return Ok(());
        }
        let result = self.link_generics(entry);
        entry.finish_initialization(result.is_ok());
        result
    }

    fn link_generics(&self, entry: &Arc<Entry>) -> Result<(), WeaveError> {
        if let Some(link) = entry.unit().origin.clone() {
            let parent = self.obtain(&link.definition)?;
            parent.link_child(entry, &*self.installer)?;
        }
        if entry.unit().is_definition {
            let definition_id = entry.id().clone();
            for info in self.catalog.loaded_units() {
                if info.origin.as_ref().is_some_and(|link| link.definition.id == definition_id) {
                    self.obtain(&info)?;
                }
            }
        }
        Ok(())
    }

    /// Attach aspect type `A` to `unit`.
    pub fn add<A: Aspect + Default>(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        let (id, aspect) = self.singleton::<A>();
        self.add_dyn(id, aspect, unit)
    }

    pub(crate) fn add_dyn(&self, id: AspectId, aspect: Arc<dyn Aspect>, unit: &UnitInfo) -> Result<(), WeaveError> {
        self.obtain(unit)?.add(id, aspect, &*self.installer)
    }

    /// Detach aspect type `A` from `unit`; no-op if absent.
    pub fn remove<A: Aspect + Default>(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        self.obtain(unit)?.remove(AspectId::of::<A>(), &*self.installer)
    }

    /// Detach every aspect from `unit`.
    pub fn remove_all(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        let entry = self.obtain(unit)?;
        for aspect in entry.aspects() {
            entry.remove(aspect, &*self.installer)?;
        }
        Ok(())
    }

    /// Detach `aspect` from every unit carrying it.
    pub(crate) fn remove_everywhere(&self, aspect: AspectId) -> Result<(), WeaveError> {
        for entry in self.snapshot() {
            entry.remove(aspect, &*self.installer)?;
        }
        Ok(())
    }

    /// Detach every aspect from units matching `pattern`.
    pub(crate) fn remove_matching(&self, pattern: &dyn Fn(&UnitInfo) -> bool) -> Result<(), WeaveError> {
        for entry in self.snapshot() {
            if entry.is_woven() && pattern(entry.unit()) {
                for aspect in entry.aspects() {
                    entry.remove(aspect, &*self.installer)?;
                }
            }
        }
        Ok(())
    }

    /// Detach `aspect` from units matching `pattern`.
    pub(crate) fn remove_matching_aspect(&self, aspect: AspectId, pattern: &dyn Fn(&UnitInfo) -> bool) -> Result<(), WeaveError> {
        for entry in self.snapshot() {
            if entry.has_aspect(aspect) && pattern(entry.unit()) {
                entry.remove(aspect, &*self.installer)?;
            }
        }
        Ok(())
    }

    /// All units with at least one active aspect.
    pub fn index(&self) -> Vec<UnitId> {
        self.entries
            .iter()
            .filter(|slot| slot.value().is_woven())
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// All units carrying `aspect`.
    pub fn index_of(&self, aspect: AspectId) -> Vec<UnitId> {
        self.entries
            .iter()
            .filter(|slot| slot.value().has_aspect(aspect))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Active aspects on `unit`, most recently added first.
    pub fn aspects_of(&self, unit: &UnitInfo) -> Result<Vec<AspectId>, WeaveError> {
        Ok(self.obtain(unit)?.aspects())
    }

    fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.entries.iter().map(|slot| slot.value().clone()).collect()
    }
}

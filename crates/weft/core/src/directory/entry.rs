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

//! Per-unit directory entry
//!
//! An entry owns one callable unit's live state: its ordered aspect list,
//! its linked generic relatives, and the guard serializing structural
//! changes. Definition entries are bookkeeping nodes that replay their
//! aspect list onto linked instantiations; only invocable entries ever have
//! a chain installed.
//!
//! Lock ordering is parent-before-child: a definition entry is locked first,
//! then its children one at a time. Child locks are never taken before the
//! parent's during propagation, which is what keeps a definition's
//! propagate-to-children pass from deadlocking against a child's own
//! independent mutation.

use crate::contracts::ChainInstaller;
use crate::errors::WeaveError;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use weft_common::advice::Advice;
use weft_common::aspect::{Aspect, AspectId};
use weft_common::identity::{UnitId, UnitInfo};

pub(crate) const NO_OWNER: u64 = 0;

/// Stable token for the current thread, used by the reentrancy guards.
pub(crate) fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

type AspectSlot = (AspectId, Arc<dyn Aspect>);

struct EntryState {
    /// Active aspects, most recently added first.
    aspects: Vec<AspectSlot>,
    /// Instantiations linked under this definition entry.
    children: Vec<Arc<Entry>>,
    /// Definition entry this instantiation belongs to.
    parent: Weak<Entry>,
}

/// Live per-unit record of active aspects and installed chain state.
pub struct Entry {
    unit: UnitInfo,
    state: Mutex<EntryState>,
    /// Thread token of the structural change currently in flight.
    changing: AtomicU64,
    initialized: AtomicBool,
    /// Set while generic-linkage initialization is running on some stack.
    initializing: AtomicBool,
}

/// Holds an entry's lock for the duration of one structural change and
/// clears the reentrancy guard when dropped.
struct ChangeGuard<'a> {
    entry: &'a Entry,
    state: MutexGuard<'a, EntryState>,
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        self.entry.changing.store(NO_OWNER, Ordering::Release);
    }
}

impl Entry {
    pub(crate) fn new(unit: UnitInfo) -> Arc<Self> {
        Arc::new(Entry {
            unit,
            state: Mutex::new(EntryState {
                aspects: Vec::new(),
                children: Vec::new(),
                parent: Weak::new(),
            }),
            changing: AtomicU64::new(NO_OWNER),
            initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
        })
    }

    pub fn unit(&self) -> &UnitInfo {
        &self.unit
    }

    pub fn id(&self) -> &UnitId {
        &self.unit.id
    }

    pub(crate) fn is_definition(&self) -> bool {
        self.unit.is_definition
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// First caller wins the right to run generic-linkage initialization;
    /// a re-entered call on the same stack loses and skips.
    pub(crate) fn begin_initialization(&self) -> bool {
        !self.initializing.swap(true, Ordering::AcqRel)
    }

    /// Completes an initialization attempt. Only success makes the entry
    /// initialized; a failed attempt is retried on the next reference.
    pub(crate) fn finish_initialization(&self, success: bool) {
        if success {
            self.initialized.store(true, Ordering::Release);
        }
        self.initializing.store(false, Ordering::Release);
    }

    /// Current aspects, most recently added first.
    pub fn aspects(&self) -> Vec<AspectId> {
        self.state.lock().aspects.iter().map(|(id, _)| *id).collect()
    }

    pub fn has_aspect(&self, aspect: AspectId) -> bool {
        self.state.lock().aspects.iter().any(|(id, _)| *id == aspect)
    }

    pub fn is_woven(&self) -> bool {
        !self.state.lock().aspects.is_empty()
    }

    /// The definition entry this instantiation is linked to, if any.
    pub fn parent(&self) -> Option<Arc<Entry>> {
        self.state.lock().parent.upgrade()
    }

    /// Begin a structural change, failing fast if this entry is already
    /// being changed on the current call stack.
    fn begin_change(&self) -> Result<ChangeGuard<'_>, WeaveError> {
        if self.changing.load(Ordering::Acquire) == thread_token() {
            return Err(WeaveError::RecursiveWeaving(self.unit.id.clone()));
        }
        let state = self.state.lock();
        self.changing.store(thread_token(), Ordering::Release);
        Ok(ChangeGuard { entry: self, state })
    }

    /// Attach `aspect` as the outermost aspect, recompile the chain, and
    /// propagate to linked instantiations. No-op if already attached. A
    /// failed install undoes the list mutation, so the list never claims an
    /// aspect whose chain was not installed.
    pub(crate) fn add(&self, id: AspectId, aspect: Arc<dyn Aspect>, installer: &dyn ChainInstaller) -> Result<(), WeaveError> {
        let mut guard = self.begin_change()?;
        if guard.state.aspects.iter().any(|(existing, _)| *existing == id) {
            return Ok(());
        }
        guard.state.aspects.insert(0, (id, aspect.clone()));
        let applied = if self.is_definition() {
            // Parent lock is held across each child mutation.
            guard
                .state
                .children
                .clone()
                .iter()
                .try_for_each(|child| child.add(id, aspect.clone(), installer))
        } else {
            self.recompile(&guard.state, installer)
        };
        if let Err(error) = applied {
            guard.state.aspects.remove(0);
            return Err(error);
        }
        debug!(unit = %self.unit.id, aspect = %id, "aspect woven");
        Ok(())
    }

    /// Detach `aspect`, recompile, and propagate the removal. No-op if the
    /// aspect is not attached. A failed install puts the aspect back in
    /// place before returning.
    pub(crate) fn remove(&self, id: AspectId, installer: &dyn ChainInstaller) -> Result<(), WeaveError> {
        let mut guard = self.begin_change()?;
        let Some(position) = guard.state.aspects.iter().position(|(existing, _)| *existing == id) else {
            return Ok(());
        };
        let removed = guard.state.aspects.remove(position);
        let applied = if self.is_definition() {
            guard
                .state
                .children
                .clone()
                .iter()
                .try_for_each(|child| child.remove(id, installer))
        } else {
            self.recompile(&guard.state, installer)
        };
        if let Err(error) = applied {
            guard.state.aspects.insert(position, removed);
            return Err(error);
        }
        debug!(unit = %self.unit.id, aspect = %id, "aspect released");
        Ok(())
    }

    /// Link `child` as an instantiation of this definition and replay the
    /// current aspect list onto it.
    pub(crate) fn link_child(self: &Arc<Self>, child: &Arc<Entry>, installer: &dyn ChainInstaller) -> Result<(), WeaveError> {
        let mut guard = self.begin_change()?;
        if !guard.state.children.iter().any(|existing| Arc::ptr_eq(existing, child)) {
            guard.state.children.push(child.clone());
            debug!(definition = %self.unit.id, instantiation = %child.unit.id, "instantiation linked");
        }
        let inherited = guard.state.aspects.clone();
        child.adopt(self, &inherited, installer)
    }

    /// Merge `inherited` aspects from `parent` behind any locally added ones,
    /// preserving the parent's relative order. Called with the parent's lock
    /// held, per the parent-before-child ordering rule.
    fn adopt(self: &Arc<Self>, parent: &Arc<Entry>, inherited: &[AspectSlot], installer: &dyn ChainInstaller) -> Result<(), WeaveError> {
        let mut guard = self.begin_change()?;
        guard.state.parent = Arc::downgrade(parent);
        let present = guard.state.aspects.len();
        for (id, aspect) in inherited {
            if !guard.state.aspects.iter().any(|(existing, _)| existing == id) {
                guard.state.aspects.push((*id, aspect.clone()));
            }
        }
        if guard.state.aspects.len() == present {
            return Ok(());
        }
        let applied = if self.is_definition() {
            // A generic method definition in a constructed type forwards the
            // merged list onto its own instantiations.
            let merged = guard.state.aspects.clone();
            guard
                .state
                .children
                .clone()
                .iter()
                .try_for_each(|child| child.adopt(self, &merged, installer))
        } else {
            self.recompile(&guard.state, installer)
        };
        // Inherited aspects were appended, so undoing is a truncate.
        if let Err(error) = applied {
            guard.state.aspects.truncate(present);
            return Err(error);
        }
        Ok(())
    }

    /// Rebuild the composed chain from the current aspect list (outermost =
    /// most recently added) and hand it to the installer. Runs with this
    /// entry's lock held, so invokers observe either the fully-old or the
    /// fully-new chain.
    fn recompile(&self, state: &EntryState, installer: &dyn ChainInstaller) -> Result<(), WeaveError> {
        let mut chain: Vec<Advice> = Vec::new();
        for (_, aspect) in &state.aspects {
            chain.extend(aspect.advise(&self.unit));
        }
        debug!(unit = %self.unit.id, advice = chain.len(), "chain installed");
        installer.install(&self.unit, &chain)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.unit.id, self.state.lock().aspects.len())
    }
}

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

//! Weaving facade
//!
//! Public entry point of the engine. A [`Weaving`] owns the directory and
//! the generic-propagation engine and exposes the weave/release/lookup
//! surface hosts program against. Hosts also report every newly reachable
//! generic instantiation here; this facade is the single listener for those
//! events.

use crate::contracts::{ChainInstaller, UnitCatalog};
use crate::directory::Directory;
use crate::errors::WeaveError;
use crate::generics::GenericEngine;
use crate::weaver::{StandingWeaver, WeaveFlags};
use std::sync::Arc;
use tracing::info;
use weft_common::aspect::{Aspect, AspectId};
use weft_common::identity::{UnitId, UnitInfo};

/// Process-wide weaving engine.
pub struct Weaving {
    directory: Arc<Directory>,
    generics: GenericEngine,
}

impl Weaving {
    pub fn new(installer: Arc<dyn ChainInstaller>, catalog: Arc<dyn UnitCatalog>) -> Self {
        let directory = Arc::new(Directory::new(installer, catalog));
        let generics = GenericEngine::new(directory.clone());
        Weaving { directory, generics }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Weave aspect `A` onto one unit. Constructed instantiations cannot be
    /// targeted directly; weave their definition or use
    /// [`Weaving::weave_matching`] with closed-instantiation propagation.
    pub fn weave<A: Aspect + Default>(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        if unit.origin.is_some() {
            return Err(WeaveError::ClosedWeavingDisabled(unit.id.clone()));
        }
        self.directory.add::<A>(unit)?;
        info!(unit = %unit.id, aspect = %AspectId::of::<A>(), "woven");
        Ok(())
    }

    /// Weave aspect `A` onto every loaded unit matching `pattern`. With
    /// `closed_instances` set, the request also stays registered and keeps
    /// matching instantiations created afterwards.
    pub fn weave_matching<A, P>(&self, pattern: P, flags: WeaveFlags) -> Result<(), WeaveError>
    where
        A: Aspect + Default,
        P: Fn(&UnitInfo) -> bool + Send + Sync + 'static,
    {
        let (id, aspect) = self.directory.singleton::<A>();
        let weaver = Arc::new(StandingWeaver::new(id, aspect, Arc::new(pattern), flags));

        for unit in self.directory.catalog_units() {
            weaver.offer(&unit, &self.directory)?;
        }
        if weaver.flags().closed_instances {
            self.generics.register_standing(weaver)?;
        }
        info!(aspect = %id, "pattern weave complete");
        Ok(())
    }

    /// Detach aspect `A` from one unit. No-op when the aspect is not
    /// present. Unlike weaving, releasing may target a constructed
    /// instantiation directly; the cut is local and never propagates back
    /// to the definition.
    pub fn release<A: Aspect + Default>(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        self.directory.remove::<A>(unit)?;
        info!(unit = %unit.id, aspect = %AspectId::of::<A>(), "released");
        Ok(())
    }

    /// Detach every aspect from one unit, restoring its original behavior.
    pub fn release_all(&self, unit: &UnitInfo) -> Result<(), WeaveError> {
        self.directory.remove_all(unit)
    }

    /// Retire aspect `A` everywhere: its standing weaver stops matching new
    /// instantiations and every unit carrying it is restored.
    pub fn release_aspect<A: Aspect + Default>(&self) -> Result<(), WeaveError> {
        let id = AspectId::of::<A>();
        self.generics.unregister_standing(id);
        self.directory.remove_everywhere(id)?;
        info!(aspect = %id, "aspect retired");
        Ok(())
    }

    /// Detach aspect `A` from every woven unit matching `pattern`.
    pub fn release_matching<A, P>(&self, pattern: P) -> Result<(), WeaveError>
    where
        A: Aspect + Default,
        P: Fn(&UnitInfo) -> bool,
    {
        self.directory.remove_matching_aspect(AspectId::of::<A>(), &pattern)
    }

    /// Detach every aspect from every woven unit matching `pattern`.
    pub fn release_all_matching<P>(&self, pattern: P) -> Result<(), WeaveError>
    where
        P: Fn(&UnitInfo) -> bool,
    {
        self.directory.remove_matching(&pattern)
    }

    /// Active aspects on `unit`, most recently woven first.
    pub fn lookup(&self, unit: &UnitInfo) -> Result<Vec<AspectId>, WeaveError> {
        self.directory.aspects_of(unit)
    }

    /// Every unit currently carrying aspect `A`.
    pub fn lookup_aspect<A: Aspect + Default>(&self) -> Vec<UnitId> {
        self.directory.index_of(AspectId::of::<A>())
    }

    /// Every unit with at least one active aspect.
    pub fn enumerate(&self) -> Vec<UnitId> {
        self.directory.index()
    }

    /// Report a newly reachable generic instantiation. The unit inherits
    /// its definition's aspects and is offered to the standing weavers.
    pub fn instantiation_created(&self, unit: UnitInfo) -> Result<(), WeaveError> {
        self.generics.instantiation_created(unit)
    }
}

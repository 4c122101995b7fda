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

//! Pattern weaver
//!
//! A pattern weaver applies a predicate over callable units and weaves its
//! aspect onto the matches. With closed-instantiation propagation enabled it
//! stays registered as a standing weaver, so instantiations created after
//! the weave call are matched the moment they appear.
//!
//! Predicates must be pure with respect to the directory itself: a predicate
//! that weaves or releases from inside its own evaluation trips the
//! reentrancy guard of the entry being offered.

use crate::directory::Directory;
use crate::errors::WeaveError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use weft_common::aspect::{Aspect, AspectId};
use weft_common::identity::UnitInfo;

/// Controls how a weave request treats generic units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaveFlags {
    /// Match and advise open generic definitions themselves.
    pub open_definitions: bool,
    /// Match and advise constructed instantiations, including ones created
    /// after the weave call.
    pub closed_instances: bool,
}

impl WeaveFlags {
    pub const NONE: WeaveFlags = WeaveFlags {
        open_definitions: false,
        closed_instances: false,
    };
    pub const OPEN: WeaveFlags = WeaveFlags {
        open_definitions: true,
        closed_instances: false,
    };
    pub const CLOSED: WeaveFlags = WeaveFlags {
        open_definitions: false,
        closed_instances: true,
    };
    pub const ALL: WeaveFlags = WeaveFlags {
        open_definitions: true,
        closed_instances: true,
    };
}

pub type Pattern = Arc<dyn Fn(&UnitInfo) -> bool + Send + Sync>;

/// A predicate-based weave request that can outlive its initial sweep and
/// keep matching newly created instantiations.
pub struct StandingWeaver {
    aspect_id: AspectId,
    aspect: Arc<dyn Aspect>,
    pattern: Pattern,
    flags: WeaveFlags,
    /// Tombstone: a retired weaver stays in the registry until pruned but
    /// never matches again. Retirement works from inside a sweep, where the
    /// registry itself cannot be rewritten.
    retired: AtomicBool,
}

impl StandingWeaver {
    pub(crate) fn new(aspect_id: AspectId, aspect: Arc<dyn Aspect>, pattern: Pattern, flags: WeaveFlags) -> Self {
        StandingWeaver {
            aspect_id,
            aspect,
            pattern,
            flags,
            retired: AtomicBool::new(false),
        }
    }

    pub fn aspect_id(&self) -> AspectId {
        self.aspect_id
    }

    pub(crate) fn flags(&self) -> WeaveFlags {
        self.flags
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Offer one unit to this weaver; weaves when the weaver is live, the
    /// pattern matches, and the flags admit the unit's generic shape.
    pub(crate) fn offer(&self, unit: &UnitInfo, directory: &Directory) -> Result<(), WeaveError> {
        if self.is_retired() {
            return Ok(());
        }
        if unit.is_definition && !self.flags.open_definitions {
            return Ok(());
        }
        if unit.origin.is_some() && !self.flags.closed_instances {
            return Ok(());
        }
        if !(self.pattern)(unit) {
            return Ok(());
        }
        debug!(unit = %unit.id, aspect = %self.aspect_id, "pattern matched");
        directory.add_dyn(self.aspect_id, self.aspect.clone(), unit)
    }
}

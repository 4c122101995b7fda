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

//! Collaborator boundaries consumed by the weaving directory.

use crate::errors::WeaveError;
use weft_common::advice::Advice;
use weft_common::identity::UnitInfo;

/// Code-generation collaborator: compiles an ordered advice list into a
/// unit's live entry point.
pub trait ChainInstaller: Send + Sync {
    /// Whether `unit` can be intercepted at all.
    fn supports(&self, unit: &UnitInfo) -> bool;

    /// Compose `chain` (outermost advice first) around the unit's original
    /// body and swap it in as the live entry point. An empty chain restores
    /// the original body. Must be atomic from an invoker's perspective and
    /// safe to call repeatedly.
    fn install(&self, unit: &UnitInfo, chain: &[Advice]) -> Result<(), WeaveError>;
}

/// Discovery collaborator: enumerates currently loaded callable units.
///
/// Instantiation events are delivered separately, by the host calling
/// [`crate::engine::Weaving::instantiation_created`] the moment a new
/// generic instantiation becomes reachable.
pub trait UnitCatalog: Send + Sync {
    fn loaded_units(&self) -> Vec<UnitInfo>;
}

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

use thiserror::Error;
use weft_common::identity::UnitId;

/// Errors raised by weave/release operations.
///
/// Structural errors abort only the call that caused them; the entry the
/// call touched is left exactly as it was before the call.
#[derive(Error, Debug)]
pub enum WeaveError {
    /// The code-generation collaborator cannot intercept this unit.
    #[error("unit '{0}' is not instrumented for interception and cannot be supervised")]
    UnsupportedUnit(UnitId),
    /// A structural change re-entered an entry already being changed on the
    /// same call stack, typically from advice logic triggering a weave on
    /// the unit it is being installed on.
    #[error("recursively modifying the weaving of '{0}' is not supported")]
    RecursiveWeaving(UnitId),
    /// A generic unit was named directly in a weave request without enabling
    /// closed-instantiation propagation.
    #[error("weaving generic unit '{0}' requires enabling closed-instantiation propagation")]
    ClosedWeavingDisabled(UnitId),
    /// A standing weaver was registered from inside the application of
    /// another standing weaver.
    #[error("standing weavers cannot be registered recursively")]
    RecursiveStandingWeaver,
    /// Invocation of a unit the dispatch table does not know.
    #[error("unknown unit '{0}'")]
    UnknownUnit(UnitId),
}

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

//! Shared data model for the weaving engine: callable-unit identity,
//! the aspect/advice contract, and the dynamically typed call values
//! that flow through composed interception chains.

pub mod advice;
pub mod aspect;
pub mod identity;

pub use advice::{Advice, CallValue, EntryPoint, Joinpoint};
pub use aspect::{Aspect, AspectId};
pub use identity::{GenericLink, Signature, UnitId, UnitInfo, UnitKind};

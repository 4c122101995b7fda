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

//! Live method-interception engine.
//!
//! Aspects attach to and detach from callable units at runtime; every later
//! invocation of a woven unit flows through the composed advice chain. The
//! weaving directory keeps the unit-to-aspect mapping live and correct under
//! concurrent weave/release/invoke traffic, including the propagation of
//! aspects from generic definitions onto lazily created instantiations.

pub mod contracts;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod generics;
pub mod weaver;

pub use contracts::{ChainInstaller, UnitCatalog};
pub use dispatch::DispatchTable;
pub use engine::Weaving;
pub use errors::WeaveError;
pub use weaver::WeaveFlags;

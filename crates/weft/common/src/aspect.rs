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

//! Aspect contract
//!
//! An aspect is a policy that, given a callable unit, produces the advice to
//! compose into that unit's chain. Registry identity is the aspect *type*:
//! the engine materializes one singleton instance per type, and attaching the
//! same aspect type to a unit twice is idempotent.

use crate::advice::Advice;
use crate::identity::UnitInfo;
use std::any::{Any, TypeId, type_name};
use std::fmt;

/// A policy producing advice for callable units.
///
/// Implementations must be stateless or synchronize their own state; the
/// engine may call [`Aspect::advise`] from any thread.
pub trait Aspect: Any + Send + Sync {
    /// Produce the advice this aspect contributes to `unit`; may be empty.
    fn advise(&self, unit: &UnitInfo) -> Vec<Advice>;
}

/// Type-level identity of an aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectId {
    type_id: TypeId,
    name: &'static str,
}

impl AspectId {
    pub fn of<A: Aspect>() -> Self {
        AspectId {
            type_id: TypeId::of::<A>(),
            name: type_name::<A>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name of the aspect.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the aspect type name.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl fmt::Display for AspectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tracing;

    #[derive(Default)]
    struct Caching;

    impl Aspect for Tracing {
        fn advise(&self, _unit: &UnitInfo) -> Vec<Advice> {
            Vec::new()
        }
    }

    impl Aspect for Caching {
        fn advise(&self, _unit: &UnitInfo) -> Vec<Advice> {
            Vec::new()
        }
    }

    #[test]
    fn test_aspect_identity_is_per_type() {
        assert_eq!(AspectId::of::<Tracing>(), AspectId::of::<Tracing>());
        assert_ne!(AspectId::of::<Tracing>(), AspectId::of::<Caching>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(AspectId::of::<Tracing>().short_name(), "Tracing");
        assert_eq!(AspectId::of::<Tracing>().to_string(), "Tracing");
    }
}

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

//! Advice model
//!
//! Advice is the opaque composition unit an aspect contributes to a unit's
//! interception chain. The engine never looks inside an advice body; it only
//! orders advice and hands the ordered list to the chain installer.

use crate::identity::UnitId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed call argument or return value.
pub type CallValue = Box<dyn Any + Send>;

/// The live entry point of a callable unit.
pub type EntryPoint = Arc<dyn Fn(&[CallValue]) -> CallValue + Send + Sync>;

/// Context handed to an advice body for one invocation.
pub struct Joinpoint<'a> {
    pub unit: &'a UnitId,
    pub args: &'a [CallValue],
}

pub type BeforeFn = Arc<dyn Fn(&Joinpoint<'_>) + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&Joinpoint<'_>, &CallValue) + Send + Sync>;
pub type AroundFn = Arc<dyn Fn(&Joinpoint<'_>, &mut dyn FnMut() -> CallValue) -> CallValue + Send + Sync>;

/// A single interception behavior composed into a unit's call chain.
///
/// Ordering among advice is significant: the chain installer composes the
/// list outermost-first, so the first advice observes the call before all
/// later ones.
#[derive(Clone)]
pub enum Advice {
    /// Runs before the rest of the chain.
    Before(BeforeFn),
    /// Runs after the rest of the chain, observing its result.
    After(AfterFn),
    /// Takes over the call; invokes the continuation zero or more times.
    Around(AroundFn),
}

impl Advice {
    pub fn before<F>(body: F) -> Self
    where
        F: Fn(&Joinpoint<'_>) + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(body))
    }

    pub fn after<F>(body: F) -> Self
    where
        F: Fn(&Joinpoint<'_>, &CallValue) + Send + Sync + 'static,
    {
        Advice::After(Arc::new(body))
    }

    pub fn around<F>(body: F) -> Self
    where
        F: Fn(&Joinpoint<'_>, &mut dyn FnMut() -> CallValue) -> CallValue + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(body))
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::Before(_) => write!(f, "Advice::Before"),
            Advice::After(_) => write!(f, "Advice::After"),
            Advice::Around(_) => write!(f, "Advice::Around"),
        }
    }
}

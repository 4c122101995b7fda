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

//! Callable-unit identity
//!
//! A callable unit is identified by its declaring type, member name (or
//! constructor marker), ordered parameter-type signature, and generic arity.
//! Two units with equal identity are the same logical member, even when
//! reached through different derived-type views; overridden members carry the
//! identity of their introducing declaration in [`UnitInfo::base`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of callable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Free function, not attached to a type.
    Function,
    /// Instance or associated method.
    Method,
    /// Constructor of the declaring type.
    Constructor,
}

/// Ordered parameter-type signature of a callable unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(Vec<String>);

impl Signature {
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Signature(parameters.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Signature(Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn parameters(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Stable identity of a callable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId {
    /// Declaring type, empty for free functions.
    pub declaring: String,
    pub kind: UnitKind,
    /// Member name; for constructors this is the declaring type's name.
    pub name: String,
    pub signature: Signature,
    /// Number of generic parameters declared by the unit itself.
    pub generic_arity: u8,
}

impl UnitId {
    pub fn function(name: impl Into<String>, signature: Signature) -> Self {
        UnitId {
            declaring: String::new(),
            kind: UnitKind::Function,
            name: name.into(),
            signature,
            generic_arity: 0,
        }
    }

    pub fn method(declaring: impl Into<String>, name: impl Into<String>, signature: Signature) -> Self {
        UnitId {
            declaring: declaring.into(),
            kind: UnitKind::Method,
            name: name.into(),
            signature,
            generic_arity: 0,
        }
    }

    pub fn constructor(declaring: impl Into<String>, signature: Signature) -> Self {
        let declaring = declaring.into();
        UnitId {
            name: declaring.clone(),
            declaring,
            kind: UnitKind::Constructor,
            signature,
            generic_arity: 0,
        }
    }

    pub fn with_generic_arity(mut self, arity: u8) -> Self {
        self.generic_arity = arity;
        self
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.declaring.is_empty() && self.kind != UnitKind::Constructor {
            write!(f, "{}::", self.declaring)?;
        }
        write!(f, "{}", self.name)?;
        if self.generic_arity > 0 {
            write!(f, "<{}>", self.generic_arity)?;
        }
        write!(f, "{}", self.signature)
    }
}

/// Link from a constructed instantiation back to its generic definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericLink {
    /// The uninstantiated template this unit was constructed from.
    pub definition: Box<UnitInfo>,
    /// Bound type arguments, in declaration order.
    pub arguments: Vec<String>,
}

/// A callable unit together with the metadata the engine needs to register it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub id: UnitId,
    /// Introducing declaration when this view is an override or redeclaration.
    pub base: Option<UnitId>,
    /// Present when this unit is a concrete instantiation of a generic
    /// definition; a generic method in a constructed generic type carries
    /// both `origin` and `is_definition`.
    pub origin: Option<GenericLink>,
    /// True when the unit is itself an uninstantiated template. Definitions
    /// are never invoked; their directory entries exist only to be replayed
    /// onto instantiations.
    pub is_definition: bool,
}

impl UnitInfo {
    /// A unit unrelated to generics.
    pub fn plain(id: UnitId) -> Self {
        UnitInfo {
            id,
            base: None,
            origin: None,
            is_definition: false,
        }
    }

    /// An open generic definition (type or method template).
    pub fn definition(id: UnitId) -> Self {
        UnitInfo {
            id,
            base: None,
            origin: None,
            is_definition: true,
        }
    }

    /// A constructed instantiation of `definition` with `arguments` bound.
    pub fn instance_of<I, S>(id: UnitId, definition: UnitInfo, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UnitInfo {
            id,
            base: None,
            origin: Some(GenericLink {
                definition: Box::new(definition),
                arguments: arguments.into_iter().map(Into::into).collect(),
            }),
            is_definition: false,
        }
    }

    /// Mark an instantiation as itself being a definition: a generic method
    /// template living inside a constructed generic type.
    pub fn as_definition(mut self) -> Self {
        self.is_definition = true;
        self
    }

    /// Record the introducing declaration this unit normalizes to.
    pub fn overriding(mut self, base: UnitId) -> Self {
        self.base = Some(base);
        self
    }

    /// Identity of the introducing declaration.
    pub fn canonical(&self) -> &UnitId {
        self.base.as_ref().unwrap_or(&self.id)
    }

    /// Whether the unit is a generic definition or an instantiation of one.
    pub fn is_generic(&self) -> bool {
        self.is_definition || self.origin.is_some()
    }
}

impl fmt::Display for UnitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_display() {
        let id = UnitId::method("Calculator", "divide", Signature::new(["f64", "f64"]));
        assert_eq!(id.to_string(), "Calculator::divide(f64, f64)");

        let generic = UnitId::method("Calculator", "sum", Signature::new(["T", "T"])).with_generic_arity(1);
        assert_eq!(generic.to_string(), "Calculator::sum<1>(T, T)");

        let ctor = UnitId::constructor("Calculator", Signature::empty());
        assert_eq!(ctor.to_string(), "Calculator()");
    }

    #[test]
    fn test_equal_identity_is_same_member() {
        let a = UnitId::method("Base", "run", Signature::new(["i32"]));
        let b = UnitId::method("Base", "run", Signature::new(["i32"]));
        assert_eq!(a, b);

        let differing_signature = UnitId::method("Base", "run", Signature::new(["i64"]));
        assert_ne!(a, differing_signature);
    }

    #[test]
    fn test_canonical_resolves_to_introducing_declaration() {
        let base = UnitId::method("Base", "run", Signature::empty());
        let derived_view = UnitInfo::plain(UnitId::method("Derived", "run", Signature::empty())).overriding(base.clone());
        assert_eq!(derived_view.canonical(), &base);

        let plain = UnitInfo::plain(UnitId::function("main", Signature::empty()));
        assert_eq!(plain.canonical(), &plain.id);
    }

    #[test]
    fn test_generic_shapes() {
        let definition = UnitInfo::definition(UnitId::method("Stack", "push", Signature::new(["T"])).with_generic_arity(1));
        assert!(definition.is_generic());
        assert!(definition.is_definition);

        let instance = UnitInfo::instance_of(UnitId::method("Stack", "push", Signature::new(["i32"])), definition.clone(), ["i32"]);
        assert!(instance.is_generic());
        assert!(!instance.is_definition);
        assert_eq!(instance.origin.as_ref().unwrap().definition.id, definition.id);

        // A generic method template inside a constructed type is both.
        let method_def = UnitInfo::instance_of(
            UnitId::method("Wrapper", "map", Signature::new(["U"])).with_generic_arity(1),
            definition,
            ["i32"],
        )
        .as_definition();
        assert!(method_def.is_definition);
        assert!(method_def.origin.is_some());
    }
}

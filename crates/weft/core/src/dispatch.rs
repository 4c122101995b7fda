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

//! In-memory dispatch table
//!
//! Stand-in for the code-generation collaborator on targets whose callable
//! units are pre-registered rather than patched in place (the
//! ahead-of-time-monomorphized case). Hosts register each unit's body once
//! and route invocations through [`DispatchTable::invoke`]; installing a
//! chain swaps the unit's live entry point atomically, so a racing invoker
//! runs either the fully-old or the fully-new chain end to end.

use crate::contracts::{ChainInstaller, UnitCatalog};
use crate::errors::WeaveError;
use dashmap::DashMap;
use std::sync::Arc;
use weft_common::advice::{Advice, CallValue, EntryPoint, Joinpoint};
use weft_common::identity::{UnitId, UnitInfo};

struct Slot {
    info: UnitInfo,
    original: EntryPoint,
    live: EntryPoint,
}

/// Registry of unit bodies and their live (possibly composed) entry points.
#[derive(Default)]
pub struct DispatchTable {
    slots: DashMap<UnitId, Slot>,
}

impl DispatchTable {
    pub fn new() -> Self {
        DispatchTable { slots: DashMap::new() }
    }

    /// Register a unit's original body. Definitions have no body and are
    /// registered for discovery only.
    pub fn register<F>(&self, info: UnitInfo, body: F)
    where
        F: Fn(&[CallValue]) -> CallValue + Send + Sync + 'static,
    {
        let original: EntryPoint = Arc::new(body);
        self.slots.insert(
            info.id.clone(),
            Slot {
                info,
                live: original.clone(),
                original,
            },
        );
    }

    /// Register a generic definition: discoverable, never invocable.
    pub fn register_definition(&self, info: UnitInfo) {
        self.register(info, |_args| Box::new(()));
    }

    /// Invoke the unit's live entry point. Definitions have no body and are
    /// rejected like unregistered units.
    pub fn invoke(&self, unit: &UnitId, args: &[CallValue]) -> Result<CallValue, WeaveError> {
        // Clone the entry point and release the slot before calling, so
        // advice bodies can weave without holding any table lock.
        let live = {
            let slot = self.slots.get(unit).ok_or_else(|| WeaveError::UnknownUnit(unit.clone()))?;
            if slot.info.is_definition {
                return Err(WeaveError::UnknownUnit(unit.clone()));
            }
            slot.live.clone()
        };
        Ok(live(args))
    }

    /// Compose `chain` around `original`, outermost advice first.
    fn compose(unit: &UnitId, original: EntryPoint, chain: &[Advice]) -> EntryPoint {
        let mut current = original;
        for advice in chain.iter().rev() {
            let inner = current;
            let unit = unit.clone();
            current = match advice {
                Advice::Before(hook) => {
                    let hook = hook.clone();
                    Arc::new(move |args: &[CallValue]| {
                        hook(&Joinpoint { unit: &unit, args });
                        inner(args)
                    })
                }
                Advice::After(hook) => {
                    let hook = hook.clone();
                    Arc::new(move |args: &[CallValue]| {
                        let result = inner(args);
                        hook(&Joinpoint { unit: &unit, args }, &result);
                        result
                    })
                }
                Advice::Around(body) => {
                    let body = body.clone();
                    Arc::new(move |args: &[CallValue]| {
                        let joinpoint = Joinpoint { unit: &unit, args };
                        let mut proceed = || inner(args);
                        body(&joinpoint, &mut proceed)
                    })
                }
            };
        }
        current
    }
}

impl ChainInstaller for DispatchTable {
    fn supports(&self, unit: &UnitInfo) -> bool {
        self.slots.contains_key(&unit.id)
    }

    fn install(&self, unit: &UnitInfo, chain: &[Advice]) -> Result<(), WeaveError> {
        let mut slot = self.slots.get_mut(&unit.id).ok_or_else(|| WeaveError::UnsupportedUnit(unit.id.clone()))?;
        slot.live = if chain.is_empty() {
            slot.original.clone()
        } else {
            Self::compose(&unit.id, slot.original.clone(), chain)
        };
        Ok(())
    }
}

impl UnitCatalog for DispatchTable {
    fn loaded_units(&self) -> Vec<UnitInfo> {
        self.slots.iter().map(|slot| slot.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use weft_common::identity::Signature;

    fn divide_unit() -> UnitInfo {
        UnitInfo::plain(UnitId::function("divide", Signature::new(["f64", "f64"])))
    }

    fn register_divide(table: &DispatchTable) -> UnitInfo {
        let unit = divide_unit();
        table.register(unit.clone(), |args| {
            let a = args[0].downcast_ref::<f64>().unwrap();
            let b = args[1].downcast_ref::<f64>().unwrap();
            Box::new(a / b)
        });
        unit
    }

    fn call_divide(table: &DispatchTable, unit: &UnitId, a: f64, b: f64) -> f64 {
        let args: Vec<CallValue> = vec![Box::new(a), Box::new(b)];
        *table.invoke(unit, &args).unwrap().downcast::<f64>().unwrap()
    }

    #[test]
    fn test_unwoven_unit_runs_original_body() {
        let table = DispatchTable::new();
        let unit = register_divide(&table);
        assert_eq!(call_divide(&table, &unit.id, 6.0, 3.0), 2.0);
    }

    #[test]
    fn test_unknown_unit_is_an_error() {
        let table = DispatchTable::new();
        let args: Vec<CallValue> = Vec::new();
        let err = table.invoke(&UnitId::function("missing", Signature::empty()), &args).unwrap_err();
        assert!(matches!(err, WeaveError::UnknownUnit(_)));
    }

    #[test]
    fn test_definitions_are_not_invocable() {
        let table = DispatchTable::new();
        let definition = UnitInfo::definition(UnitId::method("Stack", "push", Signature::new(["T"])).with_generic_arity(1));
        table.register_definition(definition.clone());

        let args: Vec<CallValue> = Vec::new();
        let err = table.invoke(&definition.id, &args).unwrap_err();
        assert!(matches!(err, WeaveError::UnknownUnit(_)));
    }

    #[test]
    fn test_before_and_after_wrap_the_body() {
        let table = DispatchTable::new();
        let unit = register_divide(&table);

        let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let enter = trace.clone();
        let exit = trace.clone();
        let chain = vec![
            Advice::before(move |_joinpoint| enter.lock().push("enter")),
            Advice::after(move |_joinpoint, _result| exit.lock().push("exit")),
        ];
        table.install(&unit, &chain).unwrap();

        assert_eq!(call_divide(&table, &unit.id, 8.0, 2.0), 4.0);
        assert_eq!(*trace.lock(), vec!["enter", "exit"]);
    }

    #[test]
    fn test_first_advice_is_outermost() {
        let table = DispatchTable::new();
        let unit = register_divide(&table);

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let outer = order.clone();
        let inner = order.clone();
        let chain = vec![
            Advice::before(move |_joinpoint| outer.lock().push("outer")),
            Advice::before(move |_joinpoint| inner.lock().push("inner")),
        ];
        table.install(&unit, &chain).unwrap();

        call_divide(&table, &unit.id, 1.0, 1.0);
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_around_controls_proceed() {
        let table = DispatchTable::new();
        let unit = register_divide(&table);

        let chain = vec![Advice::around(|_joinpoint, proceed| {
            let result = proceed();
            Box::new(result.downcast_ref::<f64>().unwrap() + 100.0)
        })];
        table.install(&unit, &chain).unwrap();
        assert_eq!(call_divide(&table, &unit.id, 6.0, 3.0), 102.0);

        // Empty chain restores the original body bit for bit.
        table.install(&unit, &[]).unwrap();
        assert_eq!(call_divide(&table, &unit.id, 6.0, 3.0), 2.0);
    }
}

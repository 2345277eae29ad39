//! Traits for converting between Rust structs and a foreign method's
//! slot-stack arguments (spec 4.N).
//!
//! Implement `FromSlots` to pull a Rust struct out of a foreign method's
//! incoming slots, and `ToSlot` to write one back as the return value.
//! Manual implementation for now; a derive macro can be added later.
//!
//! # Example
//!
//! ```ignore
//! use wrenc_sdk::{FromSlots, ToSlot, WrenVM, AbiResult};
//!
//! struct Point { x: f64, y: f64 }
//!
//! impl FromSlots for Point {
//!     fn from_slots(vm: &WrenVM, first_slot: usize) -> AbiResult<Self> {
//!         Ok(Point { x: vm.get_slot_double(first_slot)?, y: vm.get_slot_double(first_slot + 1)? })
//!     }
//! }
//!
//! impl ToSlot for Point {
//!     fn to_slot(&self, vm: &mut WrenVM, slot: usize) {
//!         vm.set_slot_new_list(slot);
//!     }
//! }
//! ```

use crate::error::AbiResult;
use crate::vm::WrenVM;

/// Reads a Rust value out of one or more consecutive slots, starting at
/// `first_slot`.
pub trait FromSlots: Sized {
    fn from_slots(vm: &WrenVM, first_slot: usize) -> AbiResult<Self>;
}

/// Writes a Rust value into a single slot as a foreign method's return value.
pub trait ToSlot {
    fn to_slot(&self, vm: &mut WrenVM, slot: usize);
}

impl FromSlots for f64 {
    fn from_slots(vm: &WrenVM, first_slot: usize) -> AbiResult<Self> {
        vm.get_slot_double(first_slot)
    }
}

impl ToSlot for f64 {
    fn to_slot(&self, vm: &mut WrenVM, slot: usize) {
        vm.set_slot_double(slot, *self);
    }
}

impl FromSlots for bool {
    fn from_slots(vm: &WrenVM, first_slot: usize) -> AbiResult<Self> {
        vm.get_slot_bool(first_slot)
    }
}

impl ToSlot for bool {
    fn to_slot(&self, vm: &mut WrenVM, slot: usize) {
        vm.set_slot_bool(slot, *self);
    }
}

impl FromSlots for String {
    fn from_slots(vm: &WrenVM, first_slot: usize) -> AbiResult<Self> {
        vm.get_slot_string(first_slot).map(|s| s.to_string())
    }
}

impl ToSlot for str {
    fn to_slot(&self, vm: &mut WrenVM, slot: usize) {
        vm.set_slot_string(slot, self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Configuration;

    #[test]
    fn f64_round_trips_through_a_slot() {
        let mut vm = WrenVM::new(Configuration::default());
        vm.ensure_slots(1);
        3.5f64.to_slot(&mut vm, 0);
        assert_eq!(f64::from_slots(&vm, 0).unwrap(), 3.5);
    }

    #[test]
    fn string_round_trips_through_a_slot() {
        let mut vm = WrenVM::new(Configuration::default());
        vm.ensure_slots(1);
        "hi".to_slot(&mut vm, 0);
        assert_eq!(String::from_slots(&vm, 0).unwrap(), "hi");
    }
}

//! Traversal helpers for intra-function entities.
//!
//! [`FuncAt<P>`] is like `(&FuncDefBody, P)` (where `P` is some type describing
//! a "position" in the function), except:
//! * it only borrows the parts of [`FuncDefBody`] needed to look up positions
//!   * this avoids accidentally accessing parts of the function definition
//!     without going through `P` (as [`EntityDefs`] requires keys for any access)
//! * it's a dedicated type with inherent methods and trait `impl`s

// NOTE(eddyb) wrong wrt lifetimes (https://github.com/rust-lang/rust-clippy/issues/5004).
#![allow(clippy::should_implement_trait)]

use crate::{
    Context, DataInst, DataInstDef, EntityDefs, EntityList, EntityListIter, FuncDefBody,
    FuncParam, Type, Value,
};

/// Immutable traversal (i.e. visiting) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. [`EntityList<DataInst>`]).
#[derive(Copy, Clone)]
pub struct FuncAt<'a, P: Copy> {
    pub params: &'a [FuncParam],
    pub data_insts: &'a EntityDefs<DataInst>,

    pub position: P,
}

impl<'a, P: Copy> FuncAt<'a, P> {
    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAt<'a, P2> {
        FuncAt { params: self.params, data_insts: self.data_insts, position: new_position }
    }
}

impl<'a> IntoIterator for FuncAt<'a, EntityList<DataInst>> {
    type IntoIter = FuncAt<'a, EntityListIter<DataInst>>;
    type Item = FuncAt<'a, DataInst>;
    fn into_iter(self) -> Self::IntoIter {
        self.at(self.position.iter())
    }
}

impl<'a> Iterator for FuncAt<'a, EntityListIter<DataInst>> {
    type Item = FuncAt<'a, DataInst>;
    fn next(&mut self) -> Option<Self::Item> {
        let (next, rest) = self.position.split_first(self.data_insts)?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl DoubleEndedIterator for FuncAt<'_, EntityListIter<DataInst>> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (prev, rest) = self.position.split_last(self.data_insts)?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> FuncAt<'a, DataInst> {
    pub fn def(self) -> &'a DataInstDef {
        &self.data_insts[self.position]
    }

    /// Shorthand for `func_at_inst.at(func_at_inst.def().inputs[input_idx])`.
    pub fn at_input(self, input_idx: u32) -> FuncAt<'a, Value> {
        self.at(self.def().inputs[input_idx as usize])
    }

    pub fn output(self) -> Option<Value> {
        self.def().output_type.map(|_| Value::DataInstOutput(self.position))
    }
}

impl<'a> FuncAt<'a, Value> {
    /// Return the [`Type`] of this [`Value`] ([`Context`] is unused for now,
    /// but kept for when values can be constants themselves).
    pub fn type_of(self, _cx: &Context) -> Type {
        match self.position {
            Value::FuncParam { idx } => self.params[idx as usize].ty,
            Value::DataInstOutput(inst) => self.at(inst).def().output_type.unwrap(),
        }
    }

    /// The [`DataInst`] defining this value, if any (i.e. not a parameter).
    pub fn producer(self) -> Option<FuncAt<'a, DataInst>> {
        match self.position {
            Value::FuncParam { .. } => None,
            Value::DataInstOutput(inst) => Some(self.at(inst)),
        }
    }
}

impl FuncDefBody {
    /// Start immutably traversing the function at `position`.
    pub fn at<P: Copy>(&self, position: P) -> FuncAt<'_, P> {
        FuncAt { params: &self.params, data_insts: &self.data_insts, position }
    }

    /// Shorthand for `func_def_body.at(func_def_body.insts)`.
    pub fn at_insts(&self) -> FuncAt<'_, EntityList<DataInst>> {
        self.at(self.insts)
    }
}

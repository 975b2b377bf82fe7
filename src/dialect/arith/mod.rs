//! `arith` ops: scalar (and elementwise) arithmetic.

use crate::Const;

pub mod bufferize;

pub use bufferize::{
    ConstantOpInterface, IndexCastOpInterface, register_bufferizable_op_interface_external_models,
};

pub const CONSTANT: &str = "arith.constant";
pub const INDEX_CAST: &str = "arith.index_cast";

/// `arith`-specific operations ([`DataInstKind::Arith`](crate::DataInstKind::Arith)).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArithOp {
    /// Materialize the constant value (its type being the output type,
    /// which can be a scalar, a tensor, or nothing else).
    Constant(Const),

    /// Convert between `index` and fixed-width integers (`inputs[0]`),
    /// either as scalars, or elementwise (over tensors or memrefs alike).
    IndexCast,
}

impl ArithOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithOp::Constant(_) => CONSTANT,
            ArithOp::IndexCast => INDEX_CAST,
        }
    }
}

//! `memref` ops: operations on addressable memory.

use crate::GlobalVar;

pub const GET_GLOBAL: &str = "memref.get_global";

/// `memref`-specific operations ([`DataInstKind::MemRef`](crate::DataInstKind::MemRef)).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemRefOp {
    /// Produce a memref pointing at the memory of a module-level global
    /// (the output type must be the global's declared type).
    GetGlobal(GlobalVar),
}

impl MemRefOp {
    pub fn name(&self) -> &'static str {
        match self {
            MemRefOp::GetGlobal(_) => GET_GLOBAL,
        }
    }
}

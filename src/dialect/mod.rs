//! Op kinds ("dialects") known to this crate, and [`OpName`]s to identify
//! any op kind (including ones defined elsewhere).

use crate::{Context, DataInstKind, InternedStr};

pub mod arith;
pub mod bufferization;
pub mod memref;

/// Interned `dialect.op` name, identifying an op kind.
///
/// This is what op interface models are keyed by, allowing them to be
/// attached to op kinds without either side knowing about the other.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct OpName(InternedStr);

impl OpName {
    pub fn new(cx: &Context, name: &str) -> Self {
        Self(cx.intern(name))
    }

    pub fn as_str(self, cx: &Context) -> &str {
        &cx[self.0]
    }

    /// The `dialect` part of a `dialect.op` name (or the whole name, if no `.`).
    pub fn dialect(self, cx: &Context) -> &str {
        let name = self.as_str(cx);
        name.split_once('.').map_or(name, |(dialect, _)| dialect)
    }
}

pub const FUNC_CALL: &str = "func.call";

impl DataInstKind {
    pub fn op_name(&self, cx: &Context) -> OpName {
        match self {
            DataInstKind::FuncCall(_) => OpName::new(cx, FUNC_CALL),
            DataInstKind::Arith(op) => OpName::new(cx, op.name()),
            DataInstKind::MemRef(op) => OpName::new(cx, op.name()),
            DataInstKind::Bufferization(op) => OpName::new(cx, op.name()),
            &DataInstKind::Custom(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::arith::ArithOp;

    #[test]
    fn op_name_interning() {
        let cx = Context::new();
        let a = OpName::new(&cx, "arith.index_cast");
        let b = DataInstKind::Arith(ArithOp::IndexCast).op_name(&cx);
        assert_eq!(a, b);
        assert_eq!(a.dialect(&cx), "arith");
        assert_eq!(OpName::new(&cx, "standalone").dialect(&cx), "standalone");
    }
}

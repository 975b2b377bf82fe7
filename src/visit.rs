//! Immutable IR traversal (of function bodies).

use crate::dialect::arith::ArithOp;
use crate::dialect::bufferization::BufferizationOp;
use crate::dialect::memref::MemRefOp;
use crate::func_at::FuncAt;
use crate::{
    AttrSet, Const, DataInst, DataInstDef, DataInstKind, Func, FuncDefBody, FuncParam, GlobalVar,
    Type, Value,
};

// FIXME(eddyb) `Sized` bound shouldn't be needed but removing it requires
// writing `impl Visitor<'a> + ?Sized` in `fn inner_visit_with` signatures.
pub trait Visitor<'a>: Sized {
    // Context-interned leaves (no default provided).
    // FIXME(eddyb) treat these separately somehow and allow e.g. automatic deep
    // visiting (with a set to avoid repeat visits) if a `Rc<Context>` is provided.
    fn visit_attr_set_use(&mut self, attrs: AttrSet);
    fn visit_type_use(&mut self, ty: Type);
    fn visit_const_use(&mut self, ct: Const);

    // Module-stored entity leaves (no default provided).
    fn visit_global_var_use(&mut self, gv: GlobalVar);
    fn visit_func_use(&mut self, func: Func);

    // Non-leaves (defaulting to calling `.inner_visit_with(self)`).
    fn visit_data_inst_def(&mut self, func_at_inst: FuncAt<'a, DataInst>) {
        func_at_inst.def().inner_visit_with(self);
    }
    fn visit_func_results(&mut self, results: &'a [Value]) {
        for v in results {
            self.visit_value_use(v);
        }
    }
    fn visit_value_use(&mut self, v: &'a Value) {
        v.inner_visit_with(self);
    }
}

/// Trait implemented on "deeply visitable" types, to further "explore" a type
/// by visiting its "interior" (i.e. variants and/or fields).
///
/// That is, an `impl InnerVisit for X` will call the relevant [`Visitor`] method
/// for each `X` field, effectively performing a single level of a deep visit.
/// Also, if `Visitor::visit_X` exists for a given `X`, its default should be to
/// call `X::inner_visit_with` (i.e. so that visiting is mostly-deep by default).
pub trait InnerVisit {
    // FIXME(eddyb) the naming here isn't great, can it be improved?
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>);
}

impl InnerVisit for FuncParam {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { attrs, ty } = *self;

        visitor.visit_attr_set_use(attrs);
        visitor.visit_type_use(ty);
    }
}

impl InnerVisit for FuncDefBody {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { params, data_insts: _, insts, results } = self;

        for param in params {
            param.inner_visit_with(visitor);
        }
        for func_at_inst in self.at(*insts) {
            visitor.visit_data_inst_def(func_at_inst);
        }
        visitor.visit_func_results(results);
    }
}

impl InnerVisit for DataInstDef {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { attrs, kind, inputs, output_type } = self;

        visitor.visit_attr_set_use(*attrs);
        kind.inner_visit_with(visitor);
        for v in inputs {
            visitor.visit_value_use(v);
        }
        if let Some(ty) = *output_type {
            visitor.visit_type_use(ty);
        }
    }
}

impl InnerVisit for DataInstKind {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        match self {
            &DataInstKind::FuncCall(func) => visitor.visit_func_use(func),
            DataInstKind::Arith(op) => match *op {
                ArithOp::Constant(ct) => visitor.visit_const_use(ct),
                ArithOp::IndexCast => {}
            },
            DataInstKind::MemRef(op) => match *op {
                MemRefOp::GetGlobal(gv) => visitor.visit_global_var_use(gv),
            },
            DataInstKind::Bufferization(op) => match op {
                BufferizationOp::ToTensor | BufferizationOp::ToMemref => {}
            },
            DataInstKind::Custom(_) => {}
        }
    }
}

impl InnerVisit for Value {
    fn inner_visit_with<'a>(&'a self, _visitor: &mut impl Visitor<'a>) {
        match *self {
            Self::FuncParam { idx: _ } | Self::DataInstOutput(_) => {}
        }
    }
}

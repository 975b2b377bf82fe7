//! Convenience API for constructing IR (mostly used by tests).

use crate::dialect::OpName;
use crate::dialect::arith::ArithOp;
use crate::error::SymbolError;
use crate::{
    Const, ConstDef, ConstKind, Context, DataInst, DataInstDef, DataInstKind, DeclDef, Dim, Func,
    FuncDecl, FuncDefBody, FuncParam, Module, ScalarLit, ScalarType, Shape, Type, TypeKind, Value,
};
use smallvec::SmallVec;

/// Ranked tensor type with `elem` elements.
pub fn tensor_type(cx: &Context, dims: impl IntoIterator<Item = Dim>, elem: ScalarType) -> Type {
    cx.intern(TypeKind::Tensor { shape: Shape::ranked(dims), elem: cx.intern(elem) })
}

/// Dense constant of the tensor type `ty`, one element per (static) position.
#[track_caller]
pub fn dense_const(cx: &Context, ty: Type, elems: impl IntoIterator<Item = i64>) -> Const {
    let elems: Vec<_> = elems.into_iter().map(ScalarLit::Int).collect();
    if let TypeKind::Tensor { shape, .. } = &cx[ty].kind {
        if let Some(n) = shape.num_elements() {
            assert_eq!(n, elems.len() as u64, "dense constant element count mismatch");
        }
    }
    cx.intern(ConstDef { attrs: Default::default(), ty, kind: ConstKind::Dense(elems.into()) })
}

/// Incrementally built function body, with ops appended in order.
pub struct FuncBuilder<'a> {
    cx: &'a Context,
    body: FuncDefBody,
}

impl<'a> FuncBuilder<'a> {
    pub fn new(cx: &'a Context, param_types: impl IntoIterator<Item = Type>) -> Self {
        let params = param_types.into_iter().map(|ty| FuncParam { attrs: Default::default(), ty });
        Self { cx, body: FuncDefBody::new(params) }
    }

    pub fn param(&self, idx: u32) -> Value {
        assert!((idx as usize) < self.body.params.len());
        Value::FuncParam { idx }
    }

    pub fn push(
        &mut self,
        kind: impl Into<DataInstKind>,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> DataInst {
        let body = &mut self.body;
        let inst = body.data_insts.define(
            DataInstDef {
                attrs: Default::default(),
                kind: kind.into(),
                inputs: inputs.into_iter().collect(),
                output_type,
            }
            .into(),
        );
        body.insts.insert_last(inst, &mut body.data_insts);
        inst
    }

    pub fn arith_constant(&mut self, ct: Const) -> Value {
        let ty = self.cx[ct].ty;
        Value::DataInstOutput(self.push(ArithOp::Constant(ct), [], Some(ty)))
    }

    pub fn index_cast(&mut self, input: Value, output_type: Type) -> Value {
        Value::DataInstOutput(self.push(ArithOp::IndexCast, [input], Some(output_type)))
    }

    /// Op of a kind unknown to this crate, named `name`.
    pub fn custom(
        &mut self,
        name: &str,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> Value {
        let inst = self.push(DataInstKind::Custom(OpName::new(self.cx, name)), inputs, output_type);
        Value::DataInstOutput(inst)
    }

    pub fn call(
        &mut self,
        callee: Func,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Option<Type>,
    ) -> Value {
        Value::DataInstOutput(self.push(DataInstKind::FuncCall(callee), inputs, output_type))
    }

    pub fn ret(&mut self, results: impl IntoIterator<Item = Value>) {
        self.body.results = results.into_iter().collect();
    }

    pub fn finish(self) -> FuncDefBody {
        self.body
    }

    /// Define the function as `name` in `module`, with return types taken
    /// from the types of the returned values.
    pub fn finish_into(self, module: &mut Module, name: &str) -> Result<Func, SymbolError> {
        let cx = self.cx;
        let body = self.body;
        let ret_types: SmallVec<[Type; 1]> =
            body.results.iter().map(|&v| body.at(v).type_of(cx)).collect();
        module.define_func(FuncDecl {
            attrs: Default::default(),
            name: cx.intern(name),
            ret_types,
            params: body.params.clone(),
            def: DeclDef::Present(body),
        })
    }
}

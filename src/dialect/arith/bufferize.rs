//! [`BufferizableOpInterface`] models for `arith` ops.

use super::{ArithOp, CONSTANT, INDEX_CAST};
use crate::bufferize::registry::OpInterfaceRegistry;
use crate::bufferize::state::BufferizationState;
use crate::bufferize::{
    BufferRelation, BufferizableOpInterface, replace_op_with_bufferized_values,
    replace_op_with_new_bufferized_op,
};
use crate::dialect::OpName;
use crate::dialect::memref::MemRefOp;
use crate::error::{Precondition, RegistryError, RewriteFailure};
use crate::func_at::FuncAt;
use crate::rewrite::Rewriter;
use crate::{Context, DataInst, DataInstDef, DataInstKind, Shape, TypeKind, Value};
use smallvec::smallvec;

/// `arith.constant` of a tensor type becomes `memref.get_global` of a
/// private constant global (deduplicated by the pool in the state).
pub struct ConstantOpInterface;

impl BufferizableOpInterface for ConstantOpInterface {
    fn bufferize(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        state: &mut BufferizationState,
    ) -> Result<(), RewriteFailure> {
        let cx = rewriter.cx();
        let def = rewriter.def(inst);
        let ct = match def.kind {
            DataInstKind::Arith(ArithOp::Constant(ct)) => ct,
            _ => return Err(Precondition::NoMatch.into()),
        };

        // Only ranked tensors can be bufferized.
        match &cx[cx[ct].ty].kind {
            TypeKind::Tensor { shape: Shape::Ranked(_), .. } => {}
            TypeKind::Tensor { shape: Shape::Unranked, .. } => {
                return Err(Precondition::UnrankedType.into());
            }
            TypeKind::Scalar(_) | TypeKind::MemRef { .. } => {
                return Err(Precondition::UnsupportedType.into());
            }
        }

        let attrs = def.attrs;
        let module = rewriter.parent_module().ok_or(Precondition::NotInModule)?;
        let gv = state.pool().borrow_mut().get_global_for(cx, module, ct)?;
        let gv_ty = module.global_vars[gv].ty;

        replace_op_with_new_bufferized_op(
            rewriter,
            state,
            inst,
            DataInstDef {
                attrs,
                kind: MemRefOp::GetGlobal(gv).into(),
                inputs: smallvec![],
                output_type: Some(gv_ty),
            },
        )?;
        Ok(())
    }

    fn is_writable(&self, _: &Context, _: FuncAt<'_, DataInst>, _: Value) -> bool {
        // Memory for constants is always backed by constant globals.
        false
    }
}

/// `arith.index_cast` over tensors becomes `arith.index_cast` over memrefs,
/// reinterpreting the buffer of its input in place.
pub struct IndexCastOpInterface;

impl BufferizableOpInterface for IndexCastOpInterface {
    fn bufferize(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        state: &mut BufferizationState,
    ) -> Result<(), RewriteFailure> {
        let cx = rewriter.cx();
        let def = rewriter.def(inst);
        if def.kind != DataInstKind::Arith(ArithOp::IndexCast) {
            return Err(Precondition::NoMatch.into());
        }
        let (attrs, output_type) = (def.attrs, def.output_type);
        let output_type = output_type.ok_or(Precondition::NoMatch)?;
        match &cx[output_type].kind {
            TypeKind::Tensor { shape: Shape::Ranked(_), .. } => {}
            TypeKind::Tensor { shape: Shape::Unranked, .. } => {
                return Err(Precondition::UnrankedType.into());
            }
            TypeKind::Scalar(_) | TypeKind::MemRef { .. } => {
                return Err(Precondition::NoMatch.into());
            }
        }

        let source = state.resolve_buffer(rewriter, inst, 0)?;
        let source_ty = rewriter.type_of(source);
        let result_ty = state.type_converter().convert_like(cx, output_type, source_ty)?;

        let new_inst = rewriter.insert_before(
            inst,
            DataInstDef {
                attrs,
                kind: ArithOp::IndexCast.into(),
                inputs: smallvec![source],
                output_type: Some(result_ty),
            },
        );
        replace_op_with_bufferized_values(rewriter, state, inst, Value::DataInstOutput(new_inst))?;
        Ok(())
    }

    fn bufferizes_to_memory_read(&self, _: &Context, _: FuncAt<'_, DataInst>, _: u32) -> bool {
        false
    }

    fn bufferizes_to_memory_write(&self, _: &Context, _: FuncAt<'_, DataInst>, _: u32) -> bool {
        false
    }

    fn aliasing_result(&self, _: &Context, _: FuncAt<'_, DataInst>, _: u32) -> Option<u32> {
        Some(0)
    }

    fn buffer_relation(&self, _: &Context, _: FuncAt<'_, DataInst>, _: u32) -> BufferRelation {
        BufferRelation::Equivalent
    }
}

/// Attach the `arith` models to their op kinds, in `registry`.
pub fn register_bufferizable_op_interface_external_models(
    cx: &Context,
    registry: &mut OpInterfaceRegistry,
) -> Result<(), RegistryError> {
    registry.register(cx, OpName::new(cx, CONSTANT), ConstantOpInterface)?;
    registry.register(cx, OpName::new(cx, INDEX_CAST), IndexCastOpInterface)?;
    Ok(())
}

//! `bufferization` ops: the boundary between tensors and memrefs, used while
//! only part of the IR has been bufferized.

use crate::error::{Precondition, RewriteFailure};
use crate::rewrite::{RewritePattern, RewritePatternSet, Rewriter};
use crate::{DataInst, DataInstKind, Value};

pub const TO_TENSOR: &str = "bufferization.to_tensor";
pub const TO_MEMREF: &str = "bufferization.to_memref";

/// `bufferization`-specific operations
/// ([`DataInstKind::Bufferization`](crate::DataInstKind::Bufferization)).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BufferizationOp {
    /// Tensor view of the contents of a memref (`inputs[0]`).
    ToTensor,

    /// Memref holding the contents of a tensor (`inputs[0]`).
    ToMemref,
}

impl BufferizationOp {
    pub fn name(self) -> &'static str {
        match self {
            BufferizationOp::ToTensor => TO_TENSOR,
            BufferizationOp::ToMemref => TO_MEMREF,
        }
    }
}

/// Fold `to_memref(to_tensor(m))` into `m`, when both memrefs have the same type.
pub struct FoldToMemrefOfToTensor;

impl RewritePattern for FoldToMemrefOfToTensor {
    fn name(&self) -> &str {
        "fold-to-memref-of-to-tensor"
    }

    fn match_and_rewrite(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure> {
        let def = rewriter.def(inst);
        if def.kind != DataInstKind::Bufferization(BufferizationOp::ToMemref) {
            return Err(Precondition::NoMatch.into());
        }
        let Value::DataInstOutput(tensor_producer) = def.inputs[0] else {
            return Err(Precondition::NoMatch.into());
        };
        let output_type = def.output_type;

        let producer_def = rewriter.def(tensor_producer);
        if producer_def.kind != DataInstKind::Bufferization(BufferizationOp::ToTensor) {
            return Err(Precondition::NoMatch.into());
        }
        let buffer = producer_def.inputs[0];
        if Some(rewriter.type_of(buffer)) != output_type {
            return Err(Precondition::NoMatch.into());
        }

        rewriter.replace_op(inst, buffer)?;
        Ok(())
    }
}

/// Erase `to_tensor` ops whose output has no uses left.
pub struct EraseDeadToTensor;

impl RewritePattern for EraseDeadToTensor {
    fn name(&self) -> &str {
        "erase-dead-to-tensor"
    }

    fn match_and_rewrite(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure> {
        if rewriter.def(inst).kind != DataInstKind::Bufferization(BufferizationOp::ToTensor)
            || rewriter.has_uses(Value::DataInstOutput(inst))
        {
            return Err(Precondition::NoMatch.into());
        }
        rewriter.erase_op(inst)?;
        Ok(())
    }
}

/// Patterns cleaning up after (partial) bufferization.
pub fn populate_boundary_cleanup_patterns(patterns: &mut RewritePatternSet) {
    patterns.add(FoldToMemrefOfToTensor).add(EraseDeadToTensor);
}

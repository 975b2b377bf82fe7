//! Per-pass bufferization state, and buffer resolution for op inputs.

use super::globals::GlobalConstantPool;
use super::options::BufferizationOptions;
use super::types::BufferizeTypeConverter;
use super::OpStatus;
use crate::dialect::bufferization::BufferizationOp;
use crate::error::{BufferizeError, Precondition, RewriteFailure};
use crate::rewrite::Rewriter;
use crate::{DataInst, DataInstDef, DataInstKind, Func, Type, TypeKind, Value};
use rustc_hash::FxHashMap;
use smallvec::smallvec;
use std::cell::RefCell;
use std::rc::Rc;

/// State shared by all the ops bufferized during one pass, over one module.
///
/// Every tensor [`Value`] is resolved to a buffer at most once, with the
/// buffer memoized (per function) for any later users.
pub struct BufferizationState {
    type_converter: Rc<BufferizeTypeConverter>,
    pool: Rc<RefCell<GlobalConstantPool>>,

    // NOTE: keyed by `Option<Func>` because `Value`s (and `DataInst`s)
    // are only unique within a function (`None` being a detached body).
    buffers: FxHashMap<(Option<Func>, Value), Value>,
    statuses: FxHashMap<(Option<Func>, DataInst), OpStatus>,

    num_model_invocations: usize,
}

impl BufferizationState {
    pub fn new(
        type_converter: Rc<BufferizeTypeConverter>,
        pool: Rc<RefCell<GlobalConstantPool>>,
    ) -> Self {
        Self {
            type_converter,
            pool,
            buffers: FxHashMap::default(),
            statuses: FxHashMap::default(),
            num_model_invocations: 0,
        }
    }

    /// Like [`new`](Self::new), wrapped for sharing between patterns.
    pub fn new_shared(
        type_converter: Rc<BufferizeTypeConverter>,
        pool: Rc<RefCell<GlobalConstantPool>>,
    ) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(type_converter, pool)))
    }

    pub fn type_converter(&self) -> &BufferizeTypeConverter {
        &self.type_converter
    }

    pub fn options(&self) -> &BufferizationOptions {
        self.type_converter.options()
    }

    pub fn pool(&self) -> &Rc<RefCell<GlobalConstantPool>> {
        &self.pool
    }

    pub fn status(&self, func: Option<Func>, inst: DataInst) -> OpStatus {
        self.statuses.get(&(func, inst)).copied().unwrap_or_default()
    }

    /// How many times any model's `bufferize` method was invoked.
    pub fn num_model_invocations(&self) -> usize {
        self.num_model_invocations
    }

    pub fn lookup_buffer(&self, func: Option<Func>, tensor: Value) -> Option<Value> {
        self.buffers.get(&(func, tensor)).copied()
    }

    pub fn memoize(&mut self, func: Option<Func>, tensor: Value, buffer: Value) {
        self.buffers.insert((func, tensor), buffer);
    }

    /// Bufferize `inst` through the model registered for its op kind.
    ///
    /// Re-entering an op while it's still being bufferized (i.e. through
    /// the inputs of its own inputs' producers) is a fatal error.
    pub fn bufferize_op(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure> {
        let cx = rewriter.cx();
        let key = (rewriter.func(), inst);
        match self.status(key.0, inst) {
            OpStatus::Bufferizing => return Err(BufferizeError::ResolutionCycle(inst).into()),
            OpStatus::Unvisited
            | OpStatus::NotBufferizable
            | OpStatus::Bufferized
            | OpStatus::Failed => {}
        }

        let op_name = rewriter.def(inst).kind.op_name(cx);
        let Some(model) = cx.lookup_op_interface(op_name) else {
            self.statuses.insert(key, OpStatus::NotBufferizable);
            return Err(Precondition::NotBufferizable(op_name.as_str(cx).to_string()).into());
        };

        self.statuses.insert(key, OpStatus::Bufferizing);
        self.num_model_invocations += 1;
        let result = model.bufferize(rewriter, inst, self);
        let status = match &result {
            Ok(()) => OpStatus::Bufferized,
            Err(_) => OpStatus::Failed,
        };
        self.statuses.insert(key, status);

        match &result {
            Ok(()) => tracing::debug!(op = op_name.as_str(cx), ?inst, "bufferized"),
            Err(RewriteFailure::NotApplicable(reason)) => {
                tracing::trace!(op = op_name.as_str(cx), ?inst, %reason, "not bufferized");
            }
            Err(RewriteFailure::Fatal(_)) => {}
        }
        result
    }

    /// Get the buffer for input `input_idx` of `inst`, which must be a tensor.
    ///
    /// In order, this tries:
    /// 0. folding away a `bufferization.to_tensor` (of the buffer wanted)
    /// 1. a buffer memoized for the same tensor
    /// 2. bufferizing the producer of the tensor, through its model
    ///    (without a model, the input is either non-bufferizable, or given
    ///    a `bufferization.to_memref`, see [`BufferizationOptions::allow_unknown_ops`])
    pub fn resolve_buffer(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        input_idx: u32,
    ) -> Result<Value, RewriteFailure> {
        let cx = rewriter.cx();
        let func = rewriter.func();
        let tensor = rewriter.def(inst).inputs[input_idx as usize];

        let producer = rewriter.at(tensor).producer().map(|producer| producer.position);
        if let Some(producer) = producer {
            let producer_def = rewriter.def(producer);
            if producer_def.kind == DataInstKind::Bufferization(BufferizationOp::ToTensor) {
                return Ok(producer_def.inputs[0]);
            }
        }

        if let Some(buffer) = self.lookup_buffer(func, tensor) {
            tracing::trace!(?tensor, ?buffer, "reusing memoized buffer");
            return Ok(buffer);
        }

        let tensor_ty = rewriter.type_of(tensor);
        match &cx[tensor_ty].kind {
            TypeKind::Tensor { .. } => {}
            TypeKind::Scalar(_) | TypeKind::MemRef { .. } => {
                return Err(Precondition::UnsupportedType.into());
            }
        }

        let model = producer
            .map(|producer| rewriter.def(producer).kind.op_name(cx))
            .and_then(|op_name| cx.lookup_op_interface(op_name));
        match (producer, model) {
            (Some(producer), Some(_)) => {
                self.bufferize_op(rewriter, producer).map_err(|failure| match failure {
                    RewriteFailure::NotApplicable(_) => {
                        Precondition::NonBufferizableOperand { input_idx }.into()
                    }
                    RewriteFailure::Fatal(e) => RewriteFailure::Fatal(e),
                })?;
                self.lookup_buffer(func, tensor)
                    .ok_or(Precondition::NonBufferizableOperand { input_idx }.into())
            }
            (_, None) if self.options().allow_unknown_ops => {
                let buffer_ty = self.type_converter.convert_tensor_type(cx, tensor_ty, None, None)?;
                Ok(self.materialize_buffer(rewriter, Some(inst), tensor, buffer_ty))
            }
            (_, _) => Err(Precondition::NonBufferizableOperand { input_idx }.into()),
        }
    }

    /// Get a buffer of type `buffer_ty` holding the contents of `tensor`,
    /// without bufferizing anything: either the memref a `bufferization.to_tensor`
    /// was taken of, a memoized buffer, or a new `bufferization.to_memref`
    /// (inserted before `before`, or at the end of the function body).
    ///
    /// Only buffers inserted before some op are memoized, as one at the end
    /// of the function body can't be used by any op.
    pub fn materialize_buffer(
        &mut self,
        rewriter: &mut Rewriter<'_>,
        before: Option<DataInst>,
        tensor: Value,
        buffer_ty: Type,
    ) -> Value {
        let func = rewriter.func();
        if let Some(producer) = rewriter.at(tensor).producer() {
            let producer_def = producer.def();
            if producer_def.kind == DataInstKind::Bufferization(BufferizationOp::ToTensor)
                && rewriter.type_of(producer_def.inputs[0]) == buffer_ty
            {
                return producer_def.inputs[0];
            }
        }
        if let Some(buffer) = self.lookup_buffer(func, tensor) {
            if rewriter.type_of(buffer) == buffer_ty {
                tracing::trace!(?tensor, ?buffer, "reusing memoized buffer");
                return buffer;
            }
        }

        let to_memref = DataInstDef {
            attrs: Default::default(),
            kind: BufferizationOp::ToMemref.into(),
            inputs: smallvec![tensor],
            output_type: Some(buffer_ty),
        };
        match before {
            Some(before) => {
                let buffer = Value::DataInstOutput(rewriter.insert_before(before, to_memref));
                self.memoize(func, tensor, buffer);
                buffer
            }
            None => Value::DataInstOutput(rewriter.insert_last(to_memref)),
        }
    }
}

impl std::fmt::Debug for BufferizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferizationState")
            .field("options", self.options())
            .field("buffers", &self.buffers.len())
            .field("num_model_invocations", &self.num_model_invocations)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FuncBuilder, tensor_type};
    use crate::{Context, Dim, ScalarType};

    #[test]
    fn resolved_buffers_are_memoized() {
        let cx = Context::new();
        let ty = tensor_type(&cx, [Dim::Static(4)], ScalarType::F32);
        let mut b = FuncBuilder::new(&cx, [ty]);
        let arg = b.param(0);
        let Value::DataInstOutput(user) = b.custom("test.use", [arg], None) else {
            unreachable!()
        };
        let mut body = b.finish();

        let options = BufferizationOptions { allow_unknown_ops: true, ..Default::default() };
        let mut state = BufferizationState::new(
            Rc::new(BufferizeTypeConverter::new(options)),
            Rc::new(RefCell::new(GlobalConstantPool::new(None))),
        );
        let mut rewriter = Rewriter::new(&cx, None, None, &mut body);

        let first = state.resolve_buffer(&mut rewriter, user, 0).unwrap();
        let num_changes = rewriter.num_changes();
        let second = state.resolve_buffer(&mut rewriter, user, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(rewriter.num_changes(), num_changes);
        assert_eq!(state.num_model_invocations(), 0);
        assert_eq!(state.lookup_buffer(None, arg), Some(first));

        let Value::DataInstOutput(to_memref) = first else { unreachable!() };
        let to_memref_kind = DataInstKind::Bufferization(BufferizationOp::ToMemref);
        assert!(rewriter.def(to_memref).kind == to_memref_kind);
    }
}

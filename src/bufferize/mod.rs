//! The bufferization protocol: how op kinds (known to this crate or not)
//! describe rewriting themselves from tensors to memrefs.
//!
//! Any op kind can take part, by attaching a [`BufferizableOpInterface`]
//! model to its [`OpName`] in an [`OpInterfaceRegistry`], which is then
//! installed in the [`Context`] (see [`Context::append_op_interfaces`]).
//!
//! [`OpName`]: crate::dialect::OpName
//! [`OpInterfaceRegistry`]: registry::OpInterfaceRegistry

use crate::dialect::bufferization::BufferizationOp;
use crate::error::{BufferizeError, RewriteFailure};
use crate::func_at::FuncAt;
use crate::rewrite::Rewriter;
use crate::{Context, DataInst, DataInstDef, Type, TypeKind, Value};
use smallvec::smallvec;

pub mod globals;
pub mod options;
pub mod registry;
pub mod state;
pub mod types;

use state::BufferizationState;

/// How the buffer of an output relates to the buffer of an aliasing input.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum BufferRelation {
    /// Both buffers are the same memory (possibly reinterpreted).
    Equivalent,

    /// No guarantees beyond "may alias".
    Unknown,
}

/// Bufferization status of a single op, within one [`BufferizationState`].
///
/// `Unvisited -> NotBufferizable`, for ops without a model, and
/// `Unvisited -> Bufferizing -> {Bufferized, Failed}` otherwise.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum OpStatus {
    #[default]
    Unvisited,
    NotBufferizable,
    Bufferizing,
    Bufferized,

    /// Some precondition didn't hold, leaving the op untouched (it can be
    /// retried, e.g. after its inputs got bufferized).
    Failed,
}

/// Bufferization model for one op kind.
///
/// Models are stateless and shared (see [`Context::lookup_op_interface`]),
/// all per-pass state lives in the [`BufferizationState`] passed to them.
///
/// All the analysis queries have conservative defaults (i.e. reads and writes
/// everything, aliases nothing that can be described).
pub trait BufferizableOpInterface {
    /// Replace `inst` with ops over buffers, or leave it untouched and
    /// return [`RewriteFailure::NotApplicable`].
    ///
    /// All checks must happen before the first change to the IR, and buffers
    /// for inputs must be obtained through [`BufferizationState::resolve_buffer`].
    fn bufferize(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        state: &mut BufferizationState,
    ) -> Result<(), RewriteFailure>;

    /// Whether the buffer of input `input_idx` is read from.
    fn bufferizes_to_memory_read(
        &self,
        _cx: &Context,
        _func_at_inst: FuncAt<'_, DataInst>,
        _input_idx: u32,
    ) -> bool {
        true
    }

    /// Whether the buffer of input `input_idx` is written to.
    fn bufferizes_to_memory_write(
        &self,
        _cx: &Context,
        _func_at_inst: FuncAt<'_, DataInst>,
        _input_idx: u32,
    ) -> bool {
        true
    }

    /// The output (by index) whose buffer may be the buffer of input
    /// `input_idx`, if any.
    fn aliasing_result(
        &self,
        _cx: &Context,
        _func_at_inst: FuncAt<'_, DataInst>,
        _input_idx: u32,
    ) -> Option<u32> {
        None
    }

    /// How the buffer of output `output_idx` relates to the buffer of the
    /// input it aliases (see [`aliasing_result`](Self::aliasing_result)).
    fn buffer_relation(
        &self,
        _cx: &Context,
        _func_at_inst: FuncAt<'_, DataInst>,
        _output_idx: u32,
    ) -> BufferRelation {
        BufferRelation::Unknown
    }

    /// Whether the buffer backing `value` (an output of this op) may be
    /// written to, by this or any other op.
    fn is_writable(
        &self,
        _cx: &Context,
        _func_at_inst: FuncAt<'_, DataInst>,
        _value: Value,
    ) -> bool {
        true
    }
}

/// Whether any input or output of the op has a [`TypeKind::Tensor`] type.
pub fn has_tensor_semantics(cx: &Context, func_at_inst: FuncAt<'_, DataInst>) -> bool {
    let def = func_at_inst.def();
    let is_tensor = |ty: Type| matches!(cx[ty].kind, TypeKind::Tensor { .. });
    (0..def.inputs.len()).any(|i| is_tensor(func_at_inst.at_input(i as u32).type_of(cx)))
        || def.output_type.is_some_and(is_tensor)
}

/// Create `new_def` right before `old`, and replace `old` with it, going
/// through [`replace_op_with_bufferized_values`] (see its docs).
pub fn replace_op_with_new_bufferized_op(
    rewriter: &mut Rewriter<'_>,
    state: &mut BufferizationState,
    old: DataInst,
    new_def: DataInstDef,
) -> Result<DataInst, BufferizeError> {
    let new_inst = rewriter.insert_before(old, new_def);
    match rewriter.at(new_inst).output() {
        Some(buffer) => replace_op_with_bufferized_values(rewriter, state, old, buffer)?,
        None => rewriter.erase_op(old)?,
    }
    Ok(new_inst)
}

/// Replace `old` (whose output may be a tensor) with `buffer`.
///
/// Remaining users of a tensor output keep seeing a tensor, through a new
/// `bufferization.to_tensor` of `buffer` (which later users fold away),
/// and the buffer is memoized for the old output.
pub fn replace_op_with_bufferized_values(
    rewriter: &mut Rewriter<'_>,
    state: &mut BufferizationState,
    old: DataInst,
    buffer: Value,
) -> Result<(), BufferizeError> {
    let cx = rewriter.cx();
    let old_output_type = rewriter.def(old).output_type;
    let old_output = Value::DataInstOutput(old);

    let replacement = match old_output_type {
        Some(ty) if matches!(cx[ty].kind, TypeKind::Tensor { .. }) => {
            let to_tensor = rewriter.insert_before(
                old,
                DataInstDef {
                    attrs: Default::default(),
                    kind: BufferizationOp::ToTensor.into(),
                    inputs: smallvec![buffer],
                    output_type: Some(ty),
                },
            );
            Value::DataInstOutput(to_tensor)
        }
        _ => buffer,
    };

    rewriter.replace_op(old, replacement)?;
    state.memoize(rewriter.func(), old_output, buffer);
    Ok(())
}

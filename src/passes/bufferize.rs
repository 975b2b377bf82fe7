//! Bufferization passes, rewriting tensor ops (with a registered
//! [`BufferizableOpInterface`](crate::bufferize::BufferizableOpInterface)
//! model) into memref ops, over a whole [`Module`].

use crate::bufferize::globals::GlobalConstantPool;
use crate::bufferize::has_tensor_semantics;
use crate::bufferize::options::BufferizationOptions;
use crate::bufferize::state::BufferizationState;
use crate::bufferize::types::BufferizeTypeConverter;
use crate::dialect::bufferization;
use crate::dialect::{OpName, arith};
use crate::error::{BufferizeError, Precondition, RewriteFailure};
use crate::rewrite::{
    GreedyRewriteConfig, RewritePattern, RewritePatternSet, RewriteStats, Rewriter,
    apply_patterns_greedily,
};
use crate::{
    Context, DataInst, DataInstKind, DeclDef, Diag, Func, MemorySpace, Module, OpInterfacesState,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Whole-[`Module`] transformation.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, module: &mut Module) -> Result<BufferizeReport, BufferizeError>;
}

/// An op left with tensor types by a pass (see [`BufferizeReport::remaining`]).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RemainingOp {
    pub func: Func,
    pub inst: DataInst,
    pub op_name: OpName,
}

#[derive(Clone, Default, Debug)]
pub struct BufferizeReport {
    pub rewrite_stats: RewriteStats,

    /// Number of constant globals added to the module.
    pub globals_created: usize,

    /// Ops (targeted by the pass) which still have tensor types, each of
    /// them also getting a warning [`Diag`] attached.
    pub remaining: Vec<RemainingOp>,

    /// Functions whose signature still has tensor types (only reported by
    /// passes converting signatures, see [`create_func_bufferize_pass`]).
    ///
    /// [`create_func_bufferize_pass`]: super::func_bufferize::create_func_bufferize_pass
    pub unconverted_funcs: Vec<Func>,
}

impl BufferizeReport {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty() && self.unconverted_funcs.is_empty()
    }
}

/// Pattern bufferizing any op of kind `op_name` (through its model), as long
/// as it still has tensor types (making it a noop on bufferized IR).
pub struct BufferizableOpPattern {
    name: String,
    op_name: OpName,
    state: Rc<RefCell<BufferizationState>>,
}

impl BufferizableOpPattern {
    pub fn new(cx: &Context, op_name: OpName, state: Rc<RefCell<BufferizationState>>) -> Self {
        Self { name: format!("bufferize({})", op_name.as_str(cx)), op_name, state }
    }
}

impl RewritePattern for BufferizableOpPattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn match_and_rewrite(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure> {
        let cx = rewriter.cx();
        let mut state = self.state.borrow_mut();

        let func_at_inst = rewriter.at(inst);
        if func_at_inst.def().kind.op_name(cx) != self.op_name
            || state.type_converter().is_legal_op(cx, func_at_inst)
        {
            return Err(Precondition::NoMatch.into());
        }

        state.bufferize_op(rewriter, inst)
    }
}

fn populate_patterns_for_op_names(
    cx: &Context,
    op_names: impl IntoIterator<Item = OpName>,
    pool: Rc<RefCell<GlobalConstantPool>>,
    type_converter: Rc<BufferizeTypeConverter>,
    patterns: &mut RewritePatternSet,
) {
    // NOTE: all patterns share one state, so that buffers resolved by
    // one of them (e.g. for the input of an op) are reused by the others.
    let state = BufferizationState::new_shared(type_converter, pool);
    for op_name in op_names {
        patterns.add(BufferizableOpPattern::new(cx, op_name, state.clone()));
    }
}

/// Add patterns bufferizing `arith.constant` ops of tensor type.
pub fn populate_tensor_constant_bufferize_patterns(
    cx: &Context,
    pool: Rc<RefCell<GlobalConstantPool>>,
    type_converter: Rc<BufferizeTypeConverter>,
    patterns: &mut RewritePatternSet,
) {
    let op_names = [OpName::new(cx, arith::CONSTANT)];
    populate_patterns_for_op_names(cx, op_names, pool, type_converter, patterns);
}

/// Add patterns bufferizing all the `arith` ops with a model.
pub fn populate_arith_bufferize_patterns(
    cx: &Context,
    pool: Rc<RefCell<GlobalConstantPool>>,
    type_converter: Rc<BufferizeTypeConverter>,
    patterns: &mut RewritePatternSet,
) {
    let op_names = [arith::CONSTANT, arith::INDEX_CAST].map(|name| OpName::new(cx, name));
    populate_patterns_for_op_names(cx, op_names, pool, type_converter, patterns);
}

/// Add patterns bufferizing every op kind with a model in the registry
/// installed in `cx`.
pub fn populate_bufferizable_op_patterns(
    cx: &Context,
    pool: Rc<RefCell<GlobalConstantPool>>,
    type_converter: Rc<BufferizeTypeConverter>,
    patterns: &mut RewritePatternSet,
) {
    let op_names = cx.registered_op_names();
    populate_patterns_for_op_names(cx, op_names, pool, type_converter, patterns);
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum BufferizePassKind {
    TensorConstant,
    Arith,
    AllRegistered,
}

pub struct BufferizePass {
    kind: BufferizePassKind,
    options: BufferizationOptions,
    rewrite_config: GreedyRewriteConfig,
}

impl BufferizePass {
    fn new(kind: BufferizePassKind, options: BufferizationOptions) -> Self {
        Self { kind, options, rewrite_config: GreedyRewriteConfig::default() }
    }

    /// See [`create_tensor_constant_bufferize_pass`].
    pub fn tensor_constant(alignment: Option<u32>) -> Self {
        let options = BufferizationOptions { alignment, ..Default::default() };
        Self::new(BufferizePassKind::TensorConstant, options)
    }

    /// See [`create_arith_bufferize_pass`].
    pub fn arith(options: BufferizationOptions) -> Self {
        Self::new(BufferizePassKind::Arith, options)
    }

    /// See [`create_bufferize_pass`].
    pub fn all_registered(options: BufferizationOptions) -> Self {
        Self::new(BufferizePassKind::AllRegistered, options)
    }

    pub fn with_rewrite_config(self, rewrite_config: GreedyRewriteConfig) -> Self {
        Self { rewrite_config, ..self }
    }
}

/// Pass bufferizing `arith.constant` ops of tensor type, with `alignment`
/// (if any) for the constant globals backing them.
pub fn create_tensor_constant_bufferize_pass(alignment: Option<u32>) -> Box<dyn Pass> {
    Box::new(BufferizePass::tensor_constant(alignment))
}

/// Pass bufferizing all the `arith` ops with a model.
pub fn create_arith_bufferize_pass(options: BufferizationOptions) -> Box<dyn Pass> {
    Box::new(BufferizePass::arith(options))
}

/// Pass bufferizing every op kind with a model in the installed registry.
pub fn create_bufferize_pass(options: BufferizationOptions) -> Box<dyn Pass> {
    Box::new(BufferizePass::all_registered(options))
}

impl Pass for BufferizePass {
    fn name(&self) -> &'static str {
        match self.kind {
            BufferizePassKind::TensorConstant => "tensor-constant-bufferize",
            BufferizePassKind::Arith => "arith-bufferize",
            BufferizePassKind::AllRegistered => "bufferize",
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(pass = self.name()))]
    fn run(&self, module: &mut Module) -> Result<BufferizeReport, BufferizeError> {
        let cx = module.cx();
        if cx.op_interfaces_state() == OpInterfacesState::Empty {
            return Err(BufferizeError::RegistryNotInitialized { pass: self.name() });
        }
        let alignment = self.options.global_alignment()?;
        cx.freeze_op_interfaces();

        let type_converter = Rc::new(BufferizeTypeConverter::new(self.options.clone()));
        let memory_space = MemorySpace(self.options.default_memory_space);
        let mut pool = GlobalConstantPool::new(alignment).with_memory_space(memory_space);
        let num_seeded = pool.seed_from_module(&cx, &module.global_vars, &module.symbols);
        let pool = Rc::new(RefCell::new(pool));

        let mut patterns = RewritePatternSet::new();
        let populate = match self.kind {
            BufferizePassKind::TensorConstant => populate_tensor_constant_bufferize_patterns,
            BufferizePassKind::Arith => populate_arith_bufferize_patterns,
            BufferizePassKind::AllRegistered => populate_bufferizable_op_patterns,
        };
        populate(&cx, pool.clone(), type_converter, &mut patterns);
        let target_op_names: Vec<OpName> = match self.kind {
            BufferizePassKind::TensorConstant => vec![OpName::new(&cx, arith::CONSTANT)],
            BufferizePassKind::Arith => {
                [arith::CONSTANT, arith::INDEX_CAST].map(|name| OpName::new(&cx, name)).to_vec()
            }
            BufferizePassKind::AllRegistered => cx.registered_op_names(),
        };

        let rewrite_stats = apply_patterns_greedily(module, &patterns, &self.rewrite_config)?;

        let mut cleanup_patterns = RewritePatternSet::new();
        bufferization::populate_boundary_cleanup_patterns(&mut cleanup_patterns);
        apply_patterns_greedily(module, &cleanup_patterns, &self.rewrite_config)?;

        let report = BufferizeReport {
            rewrite_stats,
            globals_created: pool.borrow().len() - num_seeded,
            remaining: report_remaining_ops(module, &target_op_names),
            unconverted_funcs: vec![],
        };
        tracing::debug!(
            applied = report.rewrite_stats.applied,
            globals_created = report.globals_created,
            remaining = report.remaining.len(),
            "bufferization done"
        );
        Ok(report)
    }
}

/// Find every op (of a kind in `target_op_names`) still having tensor types,
/// and attach a warning to it.
pub(super) fn report_remaining_ops(
    module: &mut Module,
    target_op_names: &[OpName],
) -> Vec<RemainingOp> {
    let cx = module.cx();
    let mut remaining = vec![];
    for func in module.funcs.keys() {
        let DeclDef::Present(func_def_body) = &mut module.funcs[func].def else {
            continue;
        };
        let insts = func_def_body.insts.iter().collect_in(&func_def_body.data_insts);
        for inst in insts {
            let func_at_inst = func_def_body.at(inst);
            let op_name = func_at_inst.def().kind.op_name(&cx);
            let is_boundary = matches!(func_at_inst.def().kind, DataInstKind::Bufferization(_));
            if is_boundary
                || !target_op_names.contains(&op_name)
                || !has_tensor_semantics(&cx, func_at_inst)
            {
                continue;
            }

            tracing::warn!(op = op_name.as_str(&cx), ?func, ?inst, "op was not bufferized");
            let diag = Diag::warn(["op ".into(), op_name.into(), " was not bufferized".into()]);
            func_def_body.data_insts[inst].attrs.push_diag(&cx, diag);
            remaining.push(RemainingOp { func, inst, op_name });
        }
    }
    remaining
}

//! Function boundary bufferization: tensor parameters and results of every
//! [`Func`] become memrefs, and calls are rewritten to match.
//!
//! Function bodies keep working on tensors, through `bufferization.to_tensor`
//! views of the (now memref) parameters and `bufferization.to_memref`s of
//! returned tensors, both of which fold away once the ops on either side
//! of them are bufferized (by this pass, or by [`super::bufferize`] passes).

use super::bufferize::{BufferizeReport, Pass, report_remaining_ops};
use crate::bufferize::globals::GlobalConstantPool;
use crate::bufferize::options::BufferizationOptions;
use crate::bufferize::replace_op_with_new_bufferized_op;
use crate::bufferize::state::BufferizationState;
use crate::bufferize::types::BufferizeTypeConverter;
use crate::dialect::bufferization::{self, BufferizationOp};
use crate::dialect::{FUNC_CALL, OpName};
use crate::error::{BufferizeError, Precondition, RewriteFailure};
use crate::rewrite::{
    GreedyRewriteConfig, RewritePattern, RewritePatternSet, Rewriter, Use, apply_patterns_greedily,
};
use crate::{DataInst, DataInstDef, DataInstKind, Diag, Func, Module, Type, Value};
use smallvec::{SmallVec, smallvec};
use std::cell::RefCell;
use std::rc::Rc;

/// Rewrites `func.call`s with tensor inputs or output to pass memrefs instead,
/// following the (converted) signature of their callee.
pub struct FuncCallBufferizePattern {
    state: Rc<RefCell<BufferizationState>>,
}

impl RewritePattern for FuncCallBufferizePattern {
    fn name(&self) -> &str {
        "bufferize(func.call)"
    }

    fn match_and_rewrite(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure> {
        let cx = rewriter.cx();
        let mut state = self.state.borrow_mut();

        let func_at_inst = rewriter.at(inst);
        let def = func_at_inst.def();
        let DataInstKind::FuncCall(callee) = def.kind else {
            return Err(Precondition::NoMatch.into());
        };
        if state.type_converter().is_legal_op(cx, func_at_inst) {
            return Err(Precondition::NoMatch.into());
        }
        let (attrs, inputs, output_type) = (def.attrs, def.inputs.clone(), def.output_type);

        // Every type is converted before the first change.
        let input_types: SmallVec<[(Type, Type); 2]> = inputs
            .iter()
            .map(|&v| {
                let ty = rewriter.type_of(v);
                Ok((ty, state.type_converter().convert_type(cx, ty)?))
            })
            .collect::<Result<_, Precondition>>()?;
        let new_output_type =
            output_type.map(|ty| state.type_converter().convert_type(cx, ty)).transpose()?;

        let new_inputs = inputs
            .iter()
            .zip(input_types)
            .map(|(&v, (ty, buffer_ty))| {
                if ty == buffer_ty {
                    v
                } else {
                    state.materialize_buffer(rewriter, Some(inst), v, buffer_ty)
                }
            })
            .collect();

        replace_op_with_new_bufferized_op(
            rewriter,
            &mut state,
            inst,
            DataInstDef {
                attrs,
                kind: DataInstKind::FuncCall(callee),
                inputs: new_inputs,
                output_type: new_output_type,
            },
        )?;
        Ok(())
    }
}

/// Add patterns rewriting calls to follow bufferized signatures, sharing
/// `state` with the signature conversion (for its memoized parameter buffers).
pub fn populate_func_bufferize_patterns(
    state: Rc<RefCell<BufferizationState>>,
    patterns: &mut RewritePatternSet,
) {
    patterns.add(FuncCallBufferizePattern { state });
}

pub struct FuncBufferizePass {
    options: BufferizationOptions,
    rewrite_config: GreedyRewriteConfig,
}

impl FuncBufferizePass {
    pub fn new(options: BufferizationOptions) -> Self {
        Self { options, rewrite_config: GreedyRewriteConfig::default() }
    }

    pub fn with_rewrite_config(self, rewrite_config: GreedyRewriteConfig) -> Self {
        Self { rewrite_config, ..self }
    }
}

/// Pass bufferizing function signatures (and calls), leaving function
/// bodies to other bufferization passes.
pub fn create_func_bufferize_pass(options: BufferizationOptions) -> Box<dyn Pass> {
    Box::new(FuncBufferizePass::new(options))
}

impl Pass for FuncBufferizePass {
    fn name(&self) -> &'static str {
        "func-bufferize"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(pass = self.name()))]
    fn run(&self, module: &mut Module) -> Result<BufferizeReport, BufferizeError> {
        let cx = module.cx();
        self.options.validate()?;

        let type_converter = Rc::new(BufferizeTypeConverter::new(self.options.clone()));
        // NOTE: no constants are bufferized by this pass, so the pool stays empty.
        let pool = Rc::new(RefCell::new(GlobalConstantPool::new(None)));
        let state = BufferizationState::new_shared(type_converter, pool);

        let mut converted_funcs = vec![];
        let mut unconverted_funcs = vec![];
        for func in module.funcs.keys() {
            match convert_func_signature(module, func, &mut state.borrow_mut()) {
                Ok(true) => converted_funcs.push(func),
                Ok(false) => {}
                Err(reason) => {
                    tracing::warn!(?func, %reason, "function signature was not bufferized");
                    let diag = Diag::warn([
                        "function signature was not bufferized: ".into(),
                        reason.to_string().into(),
                    ]);
                    let attrs = &mut module.funcs[func].attrs;
                    if !attrs.diags(&cx).contains(&diag) {
                        attrs.push_diag(&cx, diag);
                    }
                    unconverted_funcs.push(func);
                }
            }
        }

        let mut patterns = RewritePatternSet::new();
        populate_func_bufferize_patterns(state.clone(), &mut patterns);
        let rewrite_stats = apply_patterns_greedily(module, &patterns, &self.rewrite_config)?;

        // NOTE: results go last, as their buffers are materialized at the very
        // end of function bodies, where nothing else could use them.
        for &func in &converted_funcs {
            convert_func_results(module, func, &mut state.borrow_mut());
        }

        let mut cleanup_patterns = RewritePatternSet::new();
        bufferization::populate_boundary_cleanup_patterns(&mut cleanup_patterns);
        apply_patterns_greedily(module, &cleanup_patterns, &self.rewrite_config)?;

        let report = BufferizeReport {
            rewrite_stats,
            globals_created: 0,
            remaining: report_remaining_ops(module, &[OpName::new(&cx, FUNC_CALL)]),
            unconverted_funcs,
        };
        tracing::debug!(
            converted = converted_funcs.len(),
            applied = report.rewrite_stats.applied,
            remaining = report.remaining.len(),
            "function bufferization done"
        );
        Ok(report)
    }
}

/// Bufferize the parameter and return types of `func` (all or nothing),
/// returning whether anything changed.
///
/// In the function body (if any), every use of a converted parameter is
/// redirected to a `bufferization.to_tensor` view of it, inserted at the
/// start of the body (and memoized as having that parameter as its buffer).
fn convert_func_signature(
    module: &mut Module,
    func: Func,
    state: &mut BufferizationState,
) -> Result<bool, Precondition> {
    let cx = module.cx();
    let func_decl = &module.funcs[func];
    let type_converter = state.type_converter();

    let old_param_types: SmallVec<[Type; 2]> =
        func_decl.params.iter().map(|param| param.ty).collect();
    let new_param_types = old_param_types
        .iter()
        .map(|&ty| type_converter.convert_type(&cx, ty))
        .collect::<Result<SmallVec<[Type; 2]>, _>>()?;
    let new_ret_types = func_decl
        .ret_types
        .iter()
        .map(|&ty| type_converter.convert_type(&cx, ty))
        .collect::<Result<SmallVec<[Type; 1]>, _>>()?;
    if new_param_types == old_param_types && new_ret_types == func_decl.ret_types {
        return Ok(false);
    }

    let func_decl = &mut module.funcs[func];
    for (param, &ty) in func_decl.params.iter_mut().zip(&new_param_types) {
        param.ty = ty;
    }
    func_decl.ret_types = new_ret_types;
    tracing::debug!(?func, "bufferized function signature");

    let Some((globals, func_def_body)) = module.split_func_def_body_mut(func) else {
        return Ok(true);
    };
    for (param, &ty) in func_def_body.params.iter_mut().zip(&new_param_types) {
        param.ty = ty;
    }
    let first_inst = func_def_body.insts.iter().first;
    let mut rewriter = Rewriter::new(&cx, Some(globals), Some(func), func_def_body);

    for (idx, (&old_ty, &new_ty)) in old_param_types.iter().zip(&new_param_types).enumerate() {
        if old_ty == new_ty {
            continue;
        }
        let param = Value::FuncParam { idx: idx as u32 };

        // Collected before the view exists, as it's a use of `param` itself.
        let uses: SmallVec<[Use; 4]> = rewriter.uses(param).collect();
        let view_def = DataInstDef {
            attrs: Default::default(),
            kind: BufferizationOp::ToTensor.into(),
            inputs: smallvec![param],
            output_type: Some(old_ty),
        };
        let view = Value::DataInstOutput(match first_inst {
            Some(first_inst) => rewriter.insert_before(first_inst, view_def),
            None => rewriter.insert_last(view_def),
        });
        for use_ in uses {
            match use_ {
                Use::DataInstInput { inst, input_idx } => rewriter.set_input(inst, input_idx, view),
                Use::FuncResult { result_idx } => rewriter.set_result(result_idx, view),
            }
        }
        state.memoize(Some(func), view, param);
    }
    Ok(true)
}

/// Make the results of (the body of) `func` match its converted return types,
/// through buffers materialized at the end of the body.
fn convert_func_results(module: &mut Module, func: Func, state: &mut BufferizationState) {
    let cx = module.cx();
    let ret_types = module.funcs[func].ret_types.clone();
    let Some((globals, func_def_body)) = module.split_func_def_body_mut(func) else {
        return;
    };
    let results = func_def_body.results.clone();
    let mut rewriter = Rewriter::new(&cx, Some(globals), Some(func), func_def_body);

    for (result_idx, (v, ret_ty)) in results.into_iter().zip(ret_types).enumerate() {
        if rewriter.type_of(v) != ret_ty {
            let buffer = state.materialize_buffer(&mut rewriter, None, v, ret_ty);
            rewriter.set_result(result_idx as u32, buffer);
        }
    }
}

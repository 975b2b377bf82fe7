//! Pattern-based rewriting of function bodies, driven to a fixed point.
//!
//! This is deliberately small: ops are visited in order, trying every
//! pattern on each op (first success wins), and whole sweeps are repeated
//! until one changes nothing (or [`GreedyRewriteConfig::max_iterations`]).

use crate::error::{BufferizeError, RewriteFailure};
use crate::func_at::FuncAt;
use crate::visit::{InnerVisit, Visitor};
use crate::{
    AttrSet, Const, Context, DataInst, DataInstDef, Func, FuncDefBody, FxIndexSet, GlobalVar,
    Module, ModuleGlobalsMut, Type, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

/// A single use of a [`Value`], in a function body.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Use {
    DataInstInput { inst: DataInst, input_idx: u32 },
    FuncResult { result_idx: u32 },
}

/// All the [`Use`]s of every [`Value`] in a function body.
///
/// Only kept up to date by going through a [`Rewriter`].
#[derive(Default)]
pub struct UseLists {
    map: FxHashMap<Value, FxIndexSet<Use>>,
}

impl UseLists {
    pub fn compute(func_def_body: &FuncDefBody) -> Self {
        let mut collector = UseCollector { uses: UseLists::default() };
        func_def_body.inner_visit_with(&mut collector);
        collector.uses
    }

    pub fn get(&self, v: Value) -> impl Iterator<Item = Use> + '_ {
        self.map.get(&v).into_iter().flatten().copied()
    }

    pub fn has_uses(&self, v: Value) -> bool {
        self.map.get(&v).is_some_and(|uses| !uses.is_empty())
    }

    fn add(&mut self, v: Value, use_: Use) {
        self.map.entry(v).or_default().insert(use_);
    }

    fn remove(&mut self, v: Value, use_: Use) {
        if let Some(uses) = self.map.get_mut(&v) {
            uses.shift_remove(&use_);
        }
    }

    fn take(&mut self, v: Value) -> FxIndexSet<Use> {
        self.map.remove(&v).unwrap_or_default()
    }
}

struct UseCollector {
    uses: UseLists,
}

impl<'a> Visitor<'a> for UseCollector {
    // FIXME(eddyb) this is excessive, maybe different kinds of
    // visitors should exist for module-level and function-level?
    fn visit_attr_set_use(&mut self, _: AttrSet) {}
    fn visit_type_use(&mut self, _: Type) {}
    fn visit_const_use(&mut self, _: Const) {}
    fn visit_global_var_use(&mut self, _: GlobalVar) {}
    fn visit_func_use(&mut self, _: Func) {}

    fn visit_data_inst_def(&mut self, func_at_inst: FuncAt<'a, DataInst>) {
        let inst = func_at_inst.position;
        for (input_idx, &v) in func_at_inst.def().inputs.iter().enumerate() {
            self.uses.add(v, Use::DataInstInput { inst, input_idx: input_idx as u32 });
        }
    }

    fn visit_func_results(&mut self, results: &'a [Value]) {
        for (result_idx, &v) in results.iter().enumerate() {
            self.uses.add(v, Use::FuncResult { result_idx: result_idx as u32 });
        }
    }
}

/// Mutable access to one function body (and its parent module, if any),
/// keeping [`UseLists`] up to date, and counting changes.
pub struct Rewriter<'a> {
    cx: &'a Context,
    module: Option<ModuleGlobalsMut<'a>>,
    func: Option<Func>,
    func_def_body: &'a mut FuncDefBody,

    uses: UseLists,
    erased: FxHashSet<DataInst>,
    num_changes: usize,
}

impl<'a> Rewriter<'a> {
    /// Start rewriting `func_def_body` (the body of `func` in `module`, or
    /// a detached body, if both are `None`).
    pub fn new(
        cx: &'a Context,
        module: Option<ModuleGlobalsMut<'a>>,
        func: Option<Func>,
        func_def_body: &'a mut FuncDefBody,
    ) -> Self {
        let uses = UseLists::compute(func_def_body);
        Self { cx, module, func, func_def_body, uses, erased: FxHashSet::default(), num_changes: 0 }
    }

    pub fn cx(&self) -> &'a Context {
        self.cx
    }

    pub fn func(&self) -> Option<Func> {
        self.func
    }

    pub fn func_def_body(&self) -> &FuncDefBody {
        &*self.func_def_body
    }

    pub fn at<P: Copy>(&self, position: P) -> FuncAt<'_, P> {
        self.func_def_body.at(position)
    }

    pub fn def(&self, inst: DataInst) -> &DataInstDef {
        &self.func_def_body.data_insts[inst]
    }

    pub fn type_of(&self, v: Value) -> Type {
        self.at(v).type_of(self.cx)
    }

    /// The module the function body being rewritten is part of, if any.
    pub fn parent_module(&mut self) -> Option<&mut ModuleGlobalsMut<'a>> {
        self.module.as_mut()
    }

    pub fn is_erased(&self, inst: DataInst) -> bool {
        self.erased.contains(&inst)
    }

    pub fn num_changes(&self) -> usize {
        self.num_changes
    }

    pub fn uses(&self, v: Value) -> impl Iterator<Item = Use> + '_ {
        self.uses.get(v)
    }

    pub fn has_uses(&self, v: Value) -> bool {
        self.uses.has_uses(v)
    }

    fn define(&mut self, def: DataInstDef) -> DataInst {
        let inputs = def.inputs.clone();
        let inst = self.func_def_body.data_insts.define(def.into());
        for (input_idx, v) in inputs.into_iter().enumerate() {
            self.uses.add(v, Use::DataInstInput { inst, input_idx: input_idx as u32 });
        }
        self.num_changes += 1;
        inst
    }

    pub fn insert_before(&mut self, next: DataInst, def: DataInstDef) -> DataInst {
        let inst = self.define(def);
        let body = &mut *self.func_def_body;
        body.insts.insert_before(inst, next, &mut body.data_insts);
        inst
    }

    pub fn insert_last(&mut self, def: DataInstDef) -> DataInst {
        let inst = self.define(def);
        let body = &mut *self.func_def_body;
        body.insts.insert_last(inst, &mut body.data_insts);
        inst
    }

    pub fn set_input(&mut self, inst: DataInst, input_idx: u32, v: Value) {
        let input = &mut self.func_def_body.data_insts[inst].inputs[input_idx as usize];
        let use_ = Use::DataInstInput { inst, input_idx };
        let old = std::mem::replace(input, v);
        self.uses.remove(old, use_);
        self.uses.add(v, use_);
        self.num_changes += 1;
    }

    pub fn set_result(&mut self, result_idx: u32, v: Value) {
        let result = &mut self.func_def_body.results[result_idx as usize];
        let use_ = Use::FuncResult { result_idx };
        let old = std::mem::replace(result, v);
        self.uses.remove(old, use_);
        self.uses.add(v, use_);
        self.num_changes += 1;
    }

    pub fn replace_all_uses_with(&mut self, from: Value, to: Value) {
        for use_ in self.uses.take(from) {
            match use_ {
                Use::DataInstInput { inst, input_idx } => {
                    self.func_def_body.data_insts[inst].inputs[input_idx as usize] = to;
                }
                Use::FuncResult { result_idx } => {
                    self.func_def_body.results[result_idx as usize] = to;
                }
            }
            self.uses.add(to, use_);
            self.num_changes += 1;
        }
    }

    /// Redirect all uses of the output of `old` to `new_value`, and erase `old`.
    ///
    /// Fails (before changing anything) if `old` has no output, or if the
    /// type of `new_value` differs from the type of that output.
    pub fn replace_op(&mut self, old: DataInst, new_value: Value) -> Result<(), BufferizeError> {
        let mismatch = |reason| BufferizeError::ReplacementMismatch { old, reason };
        let old_output_type = self.def(old).output_type.ok_or(mismatch("op has no output"))?;
        if new_value == Value::DataInstOutput(old) {
            return Err(mismatch("op cannot replace itself"));
        }
        if self.type_of(new_value) != old_output_type {
            return Err(mismatch("replacement value has a different type"));
        }

        self.replace_all_uses_with(Value::DataInstOutput(old), new_value);
        self.erase_op(old)
    }

    /// Remove `inst` from the function body, which requires its output
    /// (if any) to be unused.
    pub fn erase_op(&mut self, inst: DataInst) -> Result<(), BufferizeError> {
        if self.is_erased(inst) {
            return Ok(());
        }
        if self.has_uses(Value::DataInstOutput(inst)) {
            return Err(BufferizeError::EraseWithUses(inst));
        }

        let body = &mut *self.func_def_body;
        for (input_idx, &v) in body.data_insts[inst].inputs.iter().enumerate() {
            self.uses.remove(v, Use::DataInstInput { inst, input_idx: input_idx as u32 });
        }
        body.insts.remove(inst, &mut body.data_insts);
        self.erased.insert(inst);
        self.num_changes += 1;
        Ok(())
    }
}

/// A rewrite applicable to (some) single ops.
pub trait RewritePattern {
    fn name(&self) -> &str;

    /// Rewrite `inst`, or return [`RewriteFailure::NotApplicable`] without
    /// having changed anything.
    fn match_and_rewrite(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
    ) -> Result<(), RewriteFailure>;
}

/// Ordered set of [`RewritePattern`]s (earlier ones are tried first).
#[derive(Default)]
pub struct RewritePatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
}

impl RewritePatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: impl RewritePattern + 'static) -> &mut Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RewritePattern> + '_ {
        self.patterns.iter().map(|pattern| &**pattern)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreedyRewriteConfig {
    /// Maximum number of sweeps over each function body.
    pub max_iterations: usize,
}

impl Default for GreedyRewriteConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct RewriteStats {
    /// Successful pattern applications.
    pub applied: usize,

    /// Sweeps performed (the maximum, across function bodies).
    pub iterations: usize,

    /// Whether every function body reached a fixed point.
    pub converged: bool,
}

impl RewriteStats {
    fn merge(self, other: Self) -> Self {
        Self {
            applied: self.applied + other.applied,
            iterations: self.iterations.max(other.iterations),
            converged: self.converged && other.converged,
        }
    }
}

/// Apply `patterns` to every function body defined in `module`.
pub fn apply_patterns_greedily(
    module: &mut Module,
    patterns: &RewritePatternSet,
    config: &GreedyRewriteConfig,
) -> Result<RewriteStats, BufferizeError> {
    let cx = module.cx();
    let mut stats = RewriteStats { converged: true, ..Default::default() };
    for func in module.funcs.keys() {
        let Some((globals, func_def_body)) = module.split_func_def_body_mut(func) else {
            continue;
        };
        let mut rewriter = Rewriter::new(&cx, Some(globals), Some(func), func_def_body);
        let func_stats = drive(&mut rewriter, patterns, config)?;
        tracing::debug!(?func, ?func_stats, "rewrote function");
        stats = stats.merge(func_stats);
    }
    Ok(stats)
}

/// Apply `patterns` to a function body not part of any module.
pub fn apply_patterns_greedily_to_func_def_body(
    cx: &Context,
    func_def_body: &mut FuncDefBody,
    patterns: &RewritePatternSet,
    config: &GreedyRewriteConfig,
) -> Result<RewriteStats, BufferizeError> {
    drive(&mut Rewriter::new(cx, None, None, func_def_body), patterns, config)
}

fn drive(
    rewriter: &mut Rewriter<'_>,
    patterns: &RewritePatternSet,
    config: &GreedyRewriteConfig,
) -> Result<RewriteStats, BufferizeError> {
    let mut stats = RewriteStats::default();
    for _ in 0..config.max_iterations {
        stats.iterations += 1;
        let num_changes_before = rewriter.num_changes();

        // NOTE: snapshotting the list means ops inserted during this
        // sweep are only visited by the next one.
        let body = rewriter.func_def_body();
        let insts = body.insts.iter().collect_in(&body.data_insts);
        for inst in insts {
            if rewriter.is_erased(inst) {
                continue;
            }
            for pattern in patterns.iter() {
                match pattern.match_and_rewrite(rewriter, inst) {
                    Ok(()) => {
                        tracing::trace!(pattern = pattern.name(), ?inst, "applied");
                        stats.applied += 1;
                        break;
                    }
                    Err(RewriteFailure::NotApplicable(reason)) => {
                        tracing::trace!(pattern = pattern.name(), ?inst, %reason, "skipped");
                    }
                    Err(RewriteFailure::Fatal(e)) => return Err(e),
                }
                if rewriter.is_erased(inst) {
                    break;
                }
            }
        }

        if rewriter.num_changes() == num_changes_before {
            stats.converged = true;
            break;
        }
    }
    Ok(stats)
}

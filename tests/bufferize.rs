//! End-to-end tests for the bufferization passes, over whole modules.

use bufferize::builder::{FuncBuilder, dense_const, tensor_type};
use bufferize::bufferize::globals::GlobalConstantPool;
use bufferize::bufferize::options::BufferizationOptions;
use bufferize::bufferize::registry::OpInterfaceRegistry;
use bufferize::bufferize::state::BufferizationState;
use bufferize::bufferize::types::BufferizeTypeConverter;
use bufferize::bufferize::{BufferizableOpInterface, replace_op_with_new_bufferized_op};
use bufferize::dialect::{FUNC_CALL, OpName};
use bufferize::dialect::arith::{self, ArithOp, ConstantOpInterface};
use bufferize::dialect::bufferization::BufferizationOp;
use bufferize::dialect::memref::MemRefOp;
use bufferize::error::{BufferizeError, OptionsError, Precondition, RegistryError, RewriteFailure};
use bufferize::passes::bufferize::{
    create_arith_bufferize_pass, create_bufferize_pass, create_tensor_constant_bufferize_pass,
    populate_tensor_constant_bufferize_patterns,
};
use bufferize::passes::func_bufferize::create_func_bufferize_pass;
use bufferize::print::Printer;
use bufferize::rewrite::{
    GreedyRewriteConfig, RewritePatternSet, Rewriter, apply_patterns_greedily_to_func_def_body,
};
use bufferize::{
    ConstDef, ConstKind, Context, DataInst, DataInstDef, DataInstKind, DeclDef, DiagLevel, Dim,
    Func, FuncDefBody, GlobalVar, Module, OpInterfacesState, ScalarLit, ScalarType, Shape, Symbol,
    Type, TypeKind, Value, Visibility,
};
use smallvec::smallvec;
use std::cell::{Cell, RefCell};
use std::num::NonZeroU32;
use std::rc::Rc;

/// Context with the `arith` models (and any `extra` ones) installed.
fn cx_with_models(extra: impl FnOnce(&Context, &mut OpInterfaceRegistry)) -> Rc<Context> {
    let cx = Rc::new(Context::new());
    let mut registry = OpInterfaceRegistry::new();
    arith::register_bufferizable_op_interface_external_models(&cx, &mut registry).unwrap();
    extra(&cx, &mut registry);
    cx.append_op_interfaces(registry).unwrap();
    cx
}

fn body(module: &Module, func: Func) -> &FuncDefBody {
    match &module.funcs[func].def {
        DeclDef::Present(func_def_body) => func_def_body,
        DeclDef::Imported(_) => unreachable!(),
    }
}

fn insts_of_kind(
    func_def_body: &FuncDefBody,
    pred: impl Fn(&DataInstKind) -> bool,
) -> Vec<DataInst> {
    func_def_body
        .at_insts()
        .into_iter()
        .filter(|func_at_inst| pred(&func_at_inst.def().kind))
        .map(|func_at_inst| func_at_inst.position)
        .collect()
}

fn get_global_targets(func_def_body: &FuncDefBody) -> Vec<GlobalVar> {
    func_def_body
        .at_insts()
        .into_iter()
        .filter_map(|func_at_inst| match func_at_inst.def().kind {
            DataInstKind::MemRef(MemRefOp::GetGlobal(gv)) => Some(gv),
            _ => None,
        })
        .collect()
}

fn global_names(module: &Module) -> Vec<String> {
    let cx = module.cx();
    module.global_vars.iter().map(|(_, gv_decl)| cx[gv_decl.name].to_string()).collect()
}

#[test]
fn identical_constants_share_one_global() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty3 = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let ty2 = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let a = b.arith_constant(dense_const(&cx, ty3, [1, 2, 3]));
    let c = b.arith_constant(dense_const(&cx, ty3, [1, 2, 3]));
    let d = b.arith_constant(dense_const(&cx, ty2, [4, 5]));
    b.ret([a, c, d]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let report = create_tensor_constant_bufferize_pass(None).run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.globals_created, 2);
    assert_eq!(global_names(&module), ["__constant_3xi32", "__constant_2xi32"]);

    let targets = get_global_targets(body(&module, func));
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[0], targets[1]);
    assert_ne!(targets[0], targets[2]);

    for (_, gv_decl) in module.global_vars.iter() {
        assert!(gv_decl.constant);
        assert_eq!(gv_decl.visibility, Visibility::Private);
        assert_eq!(gv_decl.alignment, None);
        assert!(matches!(&cx[gv_decl.ty].kind, TypeKind::MemRef { .. }));
        assert!(matches!(
            &gv_decl.def,
            DeclDef::Present(def) if def.initializer.is_some()
        ));
    }
    assert!(insts_of_kind(body(&module, func), |kind| matches!(kind, DataInstKind::Arith(_)))
        .is_empty());
}

#[test]
fn rerunning_changes_nothing() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2), Dim::Static(2)], ScalarType::I64);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3, 4]));
    b.ret([x]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let pass = create_tensor_constant_bufferize_pass(None);
    let first = pass.run(&mut module).unwrap();
    assert_eq!(first.globals_created, 1);
    let printed = Printer::for_module(&module).func_def_body_to_string(body(&module, func));

    let second = pass.run(&mut module).unwrap();
    assert_eq!(second.globals_created, 0);
    assert_eq!(second.rewrite_stats.applied, 0);
    assert!(second.rewrite_stats.converged);
    assert_eq!(module.global_vars.len(), 1);
    assert_eq!(
        Printer::for_module(&module).func_def_body_to_string(body(&module, func)),
        printed
    );
}

#[test]
fn later_runs_reuse_existing_constant_globals() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    b.ret([x]);
    let f = b.finish_into(&mut module, "f").unwrap();

    let pass = create_tensor_constant_bufferize_pass(None);
    assert_eq!(pass.run(&mut module).unwrap().globals_created, 1);

    // The same constant, in a function added after the first run.
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    b.ret([x]);
    let g = b.finish_into(&mut module, "g").unwrap();

    let report = pass.run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.globals_created, 0);
    assert_eq!(global_names(&module), ["__constant_3xi32"]);
    assert_eq!(get_global_targets(body(&module, f)), get_global_targets(body(&module, g)));
}

#[test]
fn unranked_constant_is_left_with_a_warning() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let elem = cx.intern(ScalarType::F32);
    let unranked: Type = cx.intern(TypeKind::Tensor { shape: Shape::Unranked, elem });
    let ct = cx.intern(ConstDef {
        attrs: Default::default(),
        ty: unranked,
        kind: ConstKind::Splat(ScalarLit::from(1.0)),
    });
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(ct);
    b.ret([x]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let report = create_tensor_constant_bufferize_pass(None).run(&mut module).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.remaining.len(), 1);
    assert_eq!(report.remaining[0].op_name, OpName::new(&cx, arith::CONSTANT));
    assert_eq!(report.globals_created, 0);
    assert!(module.global_vars.is_empty());

    let func_def_body = body(&module, func);
    let def = func_def_body.at(report.remaining[0].inst).def();
    assert!(def.kind == DataInstKind::Arith(ArithOp::Constant(ct)));
    let diags = def.attrs.diags(&cx);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].level, DiagLevel::Warning);
}

#[test]
fn detached_body_is_left_untouched() {
    let cx = cx_with_models(|_, _| {});

    let ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    b.ret([x]);
    let mut func_def_body = b.finish();

    let pool = Rc::new(RefCell::new(GlobalConstantPool::new(None)));
    let mut patterns = RewritePatternSet::new();
    populate_tensor_constant_bufferize_patterns(
        &cx,
        pool.clone(),
        Rc::new(BufferizeTypeConverter::default()),
        &mut patterns,
    );
    let stats = apply_patterns_greedily_to_func_def_body(
        &cx,
        &mut func_def_body,
        &patterns,
        &GreedyRewriteConfig::default(),
    )
    .unwrap();

    assert_eq!(stats.applied, 0);
    assert!(pool.borrow().is_empty());
    let constants = insts_of_kind(&func_def_body, |kind| {
        matches!(kind, DataInstKind::Arith(ArithOp::Constant(_)))
    });
    assert_eq!(constants.len(), 1);
    assert_eq!(func_def_body.at_insts().into_iter().count(), 1);
}

#[test]
fn constant_buffers_are_not_writable() {
    let cx = cx_with_models(|_, _| {});

    let ty = tensor_type(&cx, [Dim::Static(1)], ScalarType::I8);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [7]));
    b.ret([x]);
    let func_def_body = b.finish();

    let Value::DataInstOutput(inst) = x else { unreachable!() };
    let model = cx.lookup_op_interface(OpName::new(&cx, arith::CONSTANT)).unwrap();
    assert!(!model.is_writable(&cx, func_def_body.at(inst), x));
    assert!(!ConstantOpInterface.is_writable(&cx, func_def_body.at(inst), x));
}

#[test]
fn index_cast_reuses_the_global_buffer() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let index_ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::Index);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    let y = b.index_cast(x, index_ty);
    b.ret([y]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let report = create_arith_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert!(report.is_complete());

    let func_def_body = body(&module, func);
    assert_eq!(
        Printer::for_module(&module).func_def_body_to_string(func_def_body),
        "() {\n  \
         %0: memref<3xi32> = memref.get_global @__constant_3xi32\n  \
         %1: memref<3xindex> = arith.index_cast(%0)\n  \
         %2: tensor<3xindex> = bufferization.to_tensor(%1)\n  \
         return %2\n}"
    );

    let get_globals = insts_of_kind(func_def_body, |kind| matches!(kind, DataInstKind::MemRef(_)));
    let [get_global] = get_globals[..] else {
        panic!("expected exactly one `memref.get_global`");
    };
    let [index_cast] = insts_of_kind(func_def_body, |kind| {
        *kind == DataInstKind::Arith(ArithOp::IndexCast)
    })[..] else {
        panic!("expected exactly one `arith.index_cast`");
    };
    assert_eq!(
        func_def_body.at(index_cast).def().inputs[..],
        [Value::DataInstOutput(get_global)]
    );
    assert!(
        insts_of_kind(func_def_body, |kind| {
            *kind == DataInstKind::Bufferization(BufferizationOp::ToMemref)
        })
        .is_empty()
    );
}

/// `test.source`, producing a fresh `test.alloc` buffer for its tensor output,
/// and counting how many times it was bufferized.
struct SourceOpInterface {
    invocations: Rc<Cell<usize>>,
}

impl BufferizableOpInterface for SourceOpInterface {
    fn bufferize(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        state: &mut BufferizationState,
    ) -> Result<(), RewriteFailure> {
        self.invocations.set(self.invocations.get() + 1);

        let cx = rewriter.cx();
        let tensor_ty = rewriter.def(inst).output_type.ok_or(Precondition::NoMatch)?;
        let buffer_ty = state.type_converter().convert_tensor_type(cx, tensor_ty, None, None)?;
        replace_op_with_new_bufferized_op(
            rewriter,
            state,
            inst,
            DataInstDef {
                attrs: Default::default(),
                kind: DataInstKind::Custom(OpName::new(cx, "test.alloc")),
                inputs: smallvec![],
                output_type: Some(buffer_ty),
            },
        )?;
        Ok(())
    }
}

#[test]
fn shared_operand_is_bufferized_once() {
    let invocations = Rc::new(Cell::new(0));
    let cx = cx_with_models(|cx, registry| {
        let model = SourceOpInterface { invocations: invocations.clone() };
        registry.register(cx, OpName::new(cx, "test.source"), model).unwrap();
    });
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(4)], ScalarType::I32);
    let index_ty = tensor_type(&cx, [Dim::Static(4)], ScalarType::Index);
    let mut b = FuncBuilder::new(&cx, []);
    let src = b.custom("test.source", [], Some(ty));
    let y = b.index_cast(src, index_ty);
    let z = b.index_cast(src, index_ty);
    b.ret([y, z]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let report = create_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(invocations.get(), 1);

    let func_def_body = body(&module, func);
    let test_alloc = OpName::new(&cx, "test.alloc");
    let allocs = insts_of_kind(func_def_body, |kind| *kind == DataInstKind::Custom(test_alloc));
    let [alloc] = allocs[..] else {
        panic!("expected exactly one `test.alloc`");
    };
    let index_casts = insts_of_kind(func_def_body, |kind| {
        *kind == DataInstKind::Arith(ArithOp::IndexCast)
    });
    assert_eq!(index_casts.len(), 2);
    for inst in index_casts {
        assert_eq!(func_def_body.at(inst).def().inputs[..], [Value::DataInstOutput(alloc)]);
    }
}

#[test]
fn unknown_operands_need_opting_in() {
    let build = |cx: &Rc<Context>, module: &mut Module| {
        let ty = tensor_type(cx, [Dim::Static(2)], ScalarType::I32);
        let index_ty = tensor_type(cx, [Dim::Static(2)], ScalarType::Index);
        let mut b = FuncBuilder::new(cx, [ty]);
        let arg = b.param(0);
        let y = b.index_cast(arg, index_ty);
        b.ret([y]);
        b.finish_into(module, "main").unwrap()
    };

    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());
    let func = build(&cx, &mut module);
    let report = create_arith_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert_eq!(report.remaining.len(), 1);
    assert_eq!(report.remaining[0].op_name, OpName::new(&cx, arith::INDEX_CAST));
    assert_eq!(body(&module, func).at_insts().into_iter().count(), 1);

    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());
    let func = build(&cx, &mut module);
    let options = BufferizationOptions { allow_unknown_ops: true, ..Default::default() };
    let report = create_arith_bufferize_pass(options).run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(
        Printer::for_module(&module).func_def_body_to_string(body(&module, func)),
        "(%arg0: tensor<2xi32>) {\n  \
         %0: memref<2xi32> = bufferization.to_memref(%arg0)\n  \
         %1: memref<2xindex> = arith.index_cast(%0)\n  \
         %2: tensor<2xindex> = bufferization.to_tensor(%1)\n  \
         return %2\n}"
    );
}

#[test]
fn unknown_operand_is_materialized_once() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let index_ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::Index);
    let mut b = FuncBuilder::new(&cx, [ty]);
    let arg = b.param(0);
    let y = b.index_cast(arg, index_ty);
    let z = b.index_cast(arg, index_ty);
    b.ret([y, z]);
    let func = b.finish_into(&mut module, "main").unwrap();

    let options = BufferizationOptions { allow_unknown_ops: true, ..Default::default() };
    let report = create_arith_bufferize_pass(options).run(&mut module).unwrap();
    assert!(report.is_complete());

    let func_def_body = body(&module, func);
    let [to_memref] = insts_of_kind(func_def_body, |kind| {
        *kind == DataInstKind::Bufferization(BufferizationOp::ToMemref)
    })[..] else {
        panic!("expected exactly one `bufferization.to_memref`");
    };
    assert_eq!(func_def_body.at(to_memref).def().inputs[..], [arg]);
    let index_casts = insts_of_kind(func_def_body, |kind| {
        *kind == DataInstKind::Arith(ArithOp::IndexCast)
    });
    assert_eq!(index_casts.len(), 2);
    for inst in index_casts {
        assert_eq!(func_def_body.at(inst).def().inputs[..], [Value::DataInstOutput(to_memref)]);
    }
}

#[test]
fn registry_lifecycle() {
    let cx = Rc::new(Context::new());
    let mut module = Module::new(cx.clone());
    assert!(matches!(
        create_bufferize_pass(Default::default()).run(&mut module),
        Err(BufferizeError::RegistryNotInitialized { pass: "bufferize" })
    ));
    assert_eq!(cx.op_interfaces_state(), OpInterfacesState::Empty);

    let mut registry = OpInterfaceRegistry::new();
    arith::register_bufferizable_op_interface_external_models(&cx, &mut registry).unwrap();
    cx.append_op_interfaces(registry.clone()).unwrap();
    assert_eq!(cx.op_interfaces_state(), OpInterfacesState::Installed);

    // Installing the same models twice is rejected, leaving the context as-is.
    assert_eq!(
        cx.append_op_interfaces(registry),
        Err(RegistryError::DuplicateModel(arith::CONSTANT.to_string()))
    );
    assert_eq!(cx.registered_op_names().len(), 2);

    create_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert_eq!(cx.op_interfaces_state(), OpInterfacesState::Frozen);
    assert_eq!(cx.append_op_interfaces(OpInterfaceRegistry::new()), Err(RegistryError::Frozen));
}

/// `test.reenter`, which (incorrectly) tries to bufferize itself again.
struct ReenteringOpInterface;

impl BufferizableOpInterface for ReenteringOpInterface {
    fn bufferize(
        &self,
        rewriter: &mut Rewriter<'_>,
        inst: DataInst,
        state: &mut BufferizationState,
    ) -> Result<(), RewriteFailure> {
        state.bufferize_op(rewriter, inst)
    }
}

#[test]
fn reentrant_bufferization_is_fatal() {
    let cx = cx_with_models(|cx, registry| {
        registry.register(cx, OpName::new(cx, "test.reenter"), ReenteringOpInterface).unwrap();
    });
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.custom("test.reenter", [], Some(ty));
    b.ret([x]);
    b.finish_into(&mut module, "main").unwrap();

    assert!(matches!(
        create_bufferize_pass(Default::default()).run(&mut module),
        Err(BufferizeError::ResolutionCycle(_))
    ));
}

#[test]
fn alignment_is_validated_and_propagated() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [4, 5]));
    b.ret([x]);
    b.finish_into(&mut module, "main").unwrap();

    assert!(matches!(
        create_tensor_constant_bufferize_pass(Some(12)).run(&mut module),
        Err(BufferizeError::Options(OptionsError::InvalidAlignment(12)))
    ));
    assert!(module.global_vars.is_empty());

    create_tensor_constant_bufferize_pass(Some(64)).run(&mut module).unwrap();
    let [(_, gv_decl)] = module.global_vars.iter().collect::<Vec<_>>()[..] else {
        panic!("expected exactly one global");
    };
    assert_eq!(gv_decl.alignment, NonZeroU32::new(64));
}

#[test]
fn taken_symbol_names_are_disambiguated() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    // A function already using the name a global would otherwise get.
    let mut b = FuncBuilder::new(&cx, []);
    b.ret([]);
    let squatter = b.finish_into(&mut module, "__constant_3xi32").unwrap();

    let ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    b.ret([x]);
    b.finish_into(&mut module, "main").unwrap();

    create_tensor_constant_bufferize_pass(None).run(&mut module).unwrap();
    assert_eq!(global_names(&module), ["__constant_3xi32_0"]);
    assert_eq!(
        module.symbols.lookup(cx.intern("__constant_3xi32")),
        Some(Symbol::Func(squatter))
    );
}

#[test]
fn zero_alignment_means_natural_alignment() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [4, 5]));
    b.ret([x]);
    b.finish_into(&mut module, "main").unwrap();

    let report = create_tensor_constant_bufferize_pass(Some(0)).run(&mut module).unwrap();
    assert_eq!(report.globals_created, 1);
    let [(_, gv_decl)] = module.global_vars.iter().collect::<Vec<_>>()[..] else {
        panic!("expected exactly one global");
    };
    assert_eq!(gv_decl.alignment, None);
}

#[test]
fn func_bufferize_drops_the_tensor_boundary_of_bufferized_bodies() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::I32);
    let index_ty = tensor_type(&cx, [Dim::Static(3)], ScalarType::Index);
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2, 3]));
    let y = b.index_cast(x, index_ty);
    b.ret([y]);
    let func = b.finish_into(&mut module, "main").unwrap();

    create_arith_bufferize_pass(Default::default()).run(&mut module).unwrap();
    let report = create_func_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(
        Printer::for_module(&module).func_def_body_to_string(body(&module, func)),
        "() {\n  \
         %0: memref<3xi32> = memref.get_global @__constant_3xi32\n  \
         %1: memref<3xindex> = arith.index_cast(%0)\n  \
         return %1\n}"
    );
    let func_def_body = body(&module, func);
    let Value::DataInstOutput(index_cast) = func_def_body.results[0] else { unreachable!() };
    let memref_ty = func_def_body.at(index_cast).def().output_type.unwrap();
    assert_eq!(module.funcs[func].ret_types[..], [memref_ty]);
}

#[test]
fn bufferized_params_need_no_unknown_ops() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let index_ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::Index);
    let mut b = FuncBuilder::new(&cx, [ty]);
    let arg = b.param(0);
    let y = b.index_cast(arg, index_ty);
    b.ret([y]);
    let func = b.finish_into(&mut module, "main").unwrap();

    assert!(create_func_bufferize_pass(Default::default()).run(&mut module).unwrap().is_complete());
    let report = create_arith_bufferize_pass(Default::default()).run(&mut module).unwrap();
    assert!(report.is_complete());
    assert_eq!(
        Printer::for_module(&module).func_def_body_to_string(body(&module, func)),
        "(%arg0: memref<2xi32>) {\n  \
         %0: memref<2xindex> = arith.index_cast(%arg0)\n  \
         return %0\n}"
    );
    assert_eq!(module.funcs[func].params[0].ty, body(&module, func).params[0].ty);
}

#[test]
fn calls_follow_bufferized_signatures() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let ty = tensor_type(&cx, [Dim::Static(2)], ScalarType::I32);
    let mut b = FuncBuilder::new(&cx, [ty]);
    let arg = b.param(0);
    b.ret([arg]);
    let callee = b.finish_into(&mut module, "id").unwrap();

    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(dense_const(&cx, ty, [1, 2]));
    let r = b.call(callee, [x], Some(ty));
    b.ret([r]);
    let caller = b.finish_into(&mut module, "main").unwrap();

    let pass = create_func_bufferize_pass(Default::default());
    let report = pass.run(&mut module).unwrap();
    assert!(report.is_complete());

    // The identity function returns its (memref) parameter directly.
    let callee_body = body(&module, callee);
    assert!(callee_body.insts.is_empty());
    assert_eq!(callee_body.results[..], [Value::FuncParam { idx: 0 }]);
    let memref_ty = callee_body.params[0].ty;
    assert!(matches!(cx[memref_ty].kind, TypeKind::MemRef { .. }));

    let caller_body = body(&module, caller);
    let [call] = insts_of_kind(caller_body, |kind| matches!(kind, DataInstKind::FuncCall(_)))[..]
    else {
        panic!("expected exactly one call");
    };
    let call_def = caller_body.at(call).def();
    assert_eq!(call_def.output_type, Some(memref_ty));
    assert_eq!(caller_body.results[..], [Value::DataInstOutput(call)]);
    let Value::DataInstOutput(to_memref) = call_def.inputs[0] else { unreachable!() };
    assert!(
        caller_body.at(to_memref).def().kind
            == DataInstKind::Bufferization(BufferizationOp::ToMemref)
    );

    // Bufferizing the constant afterwards folds the `to_memref` away.
    create_tensor_constant_bufferize_pass(None).run(&mut module).unwrap();
    let caller_body = body(&module, caller);
    let get_globals = insts_of_kind(caller_body, |kind| matches!(kind, DataInstKind::MemRef(_)));
    let [get_global] = get_globals[..] else {
        panic!("expected exactly one `memref.get_global`");
    };
    assert_eq!(caller_body.at(call).def().inputs[..], [Value::DataInstOutput(get_global)]);
    assert_eq!(caller_body.at_insts().into_iter().count(), 2);

    let rerun = pass.run(&mut module).unwrap();
    assert_eq!(rerun.rewrite_stats.applied, 0);
    assert!(rerun.is_complete());
}

#[test]
fn unranked_signature_is_left_with_a_warning() {
    let cx = cx_with_models(|_, _| {});
    let mut module = Module::new(cx.clone());

    let elem = cx.intern(ScalarType::F32);
    let unranked: Type = cx.intern(TypeKind::Tensor { shape: Shape::Unranked, elem });
    let mut b = FuncBuilder::new(&cx, [unranked]);
    b.ret([]);
    let callee = b.finish_into(&mut module, "sink").unwrap();

    let ct = cx.intern(ConstDef {
        attrs: Default::default(),
        ty: unranked,
        kind: ConstKind::Splat(ScalarLit::from(0.0)),
    });
    let mut b = FuncBuilder::new(&cx, []);
    let x = b.arith_constant(ct);
    b.call(callee, [x], None);
    b.ret([]);
    let caller = b.finish_into(&mut module, "main").unwrap();

    let pass = create_func_bufferize_pass(Default::default());
    let report = pass.run(&mut module).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.unconverted_funcs, [callee]);
    assert_eq!(module.funcs[callee].params[0].ty, unranked);
    assert_eq!(report.remaining.len(), 1);
    assert_eq!(report.remaining[0].func, caller);
    assert_eq!(report.remaining[0].op_name, OpName::new(&cx, FUNC_CALL));

    // Rerunning doesn't pile up more warnings on the function.
    pass.run(&mut module).unwrap();
    let diags = module.funcs[callee].attrs.diags(&cx);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].level, DiagLevel::Warning);
}

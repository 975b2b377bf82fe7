//! Textual rendering of (parts of) the IR, in an MLIR-like syntax.
//!
//! This is only meant for humans (diagnostics, logs, test failures), and has
//! no parser counterpart, so it is not guaranteed to be unambiguous.

// FIXME(eddyb) stop using `itertools` for methods like `intersperse` when they
// get stabilized on `Iterator` instead.
#![allow(unstable_name_collisions)]
use itertools::Itertools as _;

use crate::dialect::arith::ArithOp;
use crate::dialect::memref::MemRefOp;
use crate::{
    Const, ConstKind, Context, DataInst, DataInstKind, Diag, DiagLevel, DiagMsgPart, Dim,
    EntityDefs, FuncDefBody, GlobalVar, MemRefLayout, Module, ScalarLit, ScalarType, Shape, Type,
    TypeKind, Value,
};
use rustc_hash::FxHashMap;

pub struct Printer<'a> {
    cx: &'a Context,

    /// Used to print [`GlobalVar`]s by name, when printing within a module.
    global_vars: Option<&'a EntityDefs<GlobalVar>>,
}

pub trait Print {
    fn print(&self, printer: &Printer<'_>) -> String;
}

impl<'a> Printer<'a> {
    pub fn new(cx: &'a Context) -> Self {
        Self { cx, global_vars: None }
    }

    pub fn for_module(module: &'a Module) -> Self {
        Self { cx: module.cx_ref(), global_vars: Some(&module.global_vars) }
    }

    pub fn type_to_string(&self, ty: Type) -> String {
        ty.print(self)
    }

    fn dims_prefix(dims: &[Dim]) -> String {
        dims.iter()
            .map(|dim| match dim {
                Dim::Static(n) => format!("{n}x"),
                Dim::Dynamic => "?x".to_string(),
            })
            .collect()
    }

    fn shape_prefix(shape: &Shape) -> String {
        match shape {
            Shape::Ranked(dims) => Self::dims_prefix(dims),
            Shape::Unranked => "*x".to_string(),
        }
    }

    fn dim(dim: Dim) -> String {
        match dim {
            Dim::Static(n) => n.to_string(),
            Dim::Dynamic => "?".to_string(),
        }
    }

    fn global_var(&self, gv: GlobalVar) -> String {
        match self.global_vars.and_then(|global_vars| global_vars.get(gv)) {
            Some(gv_decl) => format!("@{}", &self.cx[gv_decl.name]),
            None => format!("@{gv:?}"),
        }
    }

    /// Print every op in `func_def_body`, one per line, followed by `return`.
    pub fn func_def_body_to_string(&self, func_def_body: &FuncDefBody) -> String {
        let mut value_names = FxHashMap::<DataInst, usize>::default();
        let value = |value_names: &FxHashMap<DataInst, usize>, v: Value| match v {
            Value::FuncParam { idx } => format!("%arg{idx}"),
            Value::DataInstOutput(inst) => match value_names.get(&inst) {
                Some(i) => format!("%{i}"),
                None => format!("%<dead {inst:?}>"),
            },
        };

        let params = func_def_body
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| format!("%arg{i}: {}", param.ty.print(self)))
            .join(", ");
        let mut out = format!("({params}) {{\n");

        for func_at_inst in func_def_body.at_insts() {
            let inst = func_at_inst.position;
            let def = func_at_inst.def();

            out += "  ";
            if let Some(ty) = def.output_type {
                let i = value_names.len();
                value_names.insert(inst, i);
                out += &format!("%{i}: {} = ", ty.print(self));
            }
            out += def.kind.op_name(self.cx).as_str(self.cx);

            let inputs = def.inputs.iter().map(|&v| value(&value_names, v)).join(", ");
            if !inputs.is_empty() {
                out += &format!("({inputs})");
            }
            match &def.kind {
                &DataInstKind::Arith(ArithOp::Constant(ct)) => {
                    out += &format!(" {}", ct.print(self));
                }
                &DataInstKind::MemRef(MemRefOp::GetGlobal(gv)) => {
                    out += &format!(" {}", self.global_var(gv));
                }
                &DataInstKind::FuncCall(func) => out += &format!(" {func:?}"),
                DataInstKind::Arith(ArithOp::IndexCast)
                | DataInstKind::Bufferization(_)
                | DataInstKind::Custom(_) => {}
            }
            out += "\n";
        }

        let results = func_def_body.results.iter().map(|&v| value(&value_names, v)).join(", ");
        out += &format!("  return {results}\n}}");
        out
    }
}

impl Print for ScalarType {
    fn print(&self, _printer: &Printer<'_>) -> String {
        match *self {
            ScalarType::Int { width } => format!("i{width}"),
            ScalarType::Index => "index".to_string(),
            ScalarType::Float { width } => format!("f{width}"),
        }
    }
}

impl Print for Type {
    fn print(&self, printer: &Printer<'_>) -> String {
        match &printer.cx[*self].kind {
            TypeKind::Scalar(scalar) => scalar.print(printer),
            TypeKind::Tensor { shape, elem } => {
                format!("tensor<{}{}>", Printer::shape_prefix(shape), elem.print(printer))
            }
            TypeKind::MemRef { shape, elem, layout, mem_space } => {
                let mut s =
                    format!("memref<{}{}", Printer::shape_prefix(shape), elem.print(printer));
                if let MemRefLayout::Strided { offset, strides } = layout {
                    let strides = strides.iter().map(|&stride| Printer::dim(stride)).join(", ");
                    s += &format!(", strided<[{strides}], offset: {}>", Printer::dim(*offset));
                }
                if mem_space.0 != 0 {
                    s += &format!(", {}", mem_space.0);
                }
                s + ">"
            }
        }
    }
}

impl Print for ScalarLit {
    fn print(&self, _printer: &Printer<'_>) -> String {
        match *self {
            ScalarLit::Int(x) => x.to_string(),
            ScalarLit::FloatBits(bits) => format!("{:?}", f64::from_bits(bits)),
        }
    }
}

impl Print for Const {
    fn print(&self, printer: &Printer<'_>) -> String {
        let ct_def = &printer.cx[*self];
        let value = match &ct_def.kind {
            ConstKind::Scalar(lit) => lit.print(printer),
            ConstKind::Dense(elems) => {
                format!("dense<[{}]>", elems.iter().map(|lit| lit.print(printer)).join(", "))
            }
            ConstKind::Splat(lit) => format!("dense<{}>", lit.print(printer)),
        };
        format!("{value} : {}", ct_def.ty.print(printer))
    }
}

impl Print for Diag {
    fn print(&self, printer: &Printer<'_>) -> String {
        let level = match self.level {
            DiagLevel::Bug(location) => format!("BUG {location}"),
            DiagLevel::Error => "error".to_string(),
            DiagLevel::Warning => "warning".to_string(),
        };
        let message: String = self
            .message
            .iter()
            .map(|part| match part {
                DiagMsgPart::Plain(text) => text.to_string(),
                DiagMsgPart::Type(ty) => format!("`{}`", ty.print(printer)),
                DiagMsgPart::Const(ct) => format!("`{}`", ct.print(printer)),
                DiagMsgPart::OpName(op_name) => format!("`{}`", op_name.as_str(printer.cx)),
            })
            .collect();
        format!("{level}: {message}")
    }
}

//! Deduplicating pool of constant globals, backing tensor constants.

use crate::error::{BufferizeError, Precondition, RewriteFailure};
use crate::print::Printer;
use crate::{
    Const, Context, DeclDef, Dim, EntityDefs, FxIndexMap, GlobalVar, GlobalVarDecl,
    GlobalVarDefBody, MemorySpace, ModuleGlobalsMut, Shape, Symbol, SymbolTable, TypeKind,
    Visibility,
};
use std::num::NonZeroU32;

/// How many `_N` suffixes are tried, to make a symbol name unique, before
/// giving up (see [`BufferizeError::SymbolCollision`]).
pub const MAX_SYMBOL_DISAMBIGUATION_ATTEMPTS: u32 = 1000;

/// One private constant [`GlobalVar`] per distinct tensor [`Const`], for a
/// single module.
///
/// As [`Const`]s are interned, structurally identical constants (same type
/// and contents) are the same [`Const`], and share a global.
pub struct GlobalConstantPool {
    alignment: Option<NonZeroU32>,
    memory_space: MemorySpace,

    globals: FxIndexMap<Const, GlobalVar>,
}

impl GlobalConstantPool {
    pub fn new(alignment: Option<NonZeroU32>) -> Self {
        Self { alignment, memory_space: MemorySpace::default(), globals: Default::default() }
    }

    pub fn with_memory_space(self, memory_space: MemorySpace) -> Self {
        Self { memory_space, ..self }
    }

    pub fn alignment(&self) -> Option<NonZeroU32> {
        self.alignment
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// All globals created so far, in creation order.
    pub fn globals(&self) -> impl Iterator<Item = (Const, GlobalVar)> + '_ {
        self.globals.iter().map(|(&ct, &gv)| (ct, gv))
    }

    /// Adopt the private constant globals already in a module (e.g. created by
    /// an earlier pass), returning how many were adopted.
    ///
    /// Only globals this pool could have created itself (same type, memory
    /// space and alignment) are adopted, the first one winning for each
    /// [`Const`].
    pub fn seed_from_module(
        &mut self,
        cx: &Context,
        global_vars: &EntityDefs<GlobalVar>,
        symbols: &SymbolTable,
    ) -> usize {
        let num_globals_before = self.globals.len();
        for (_, symbol) in symbols.iter() {
            let Symbol::GlobalVar(gv) = symbol else {
                continue;
            };
            let gv_decl = &global_vars[gv];
            let constant = match gv_decl {
                GlobalVarDecl {
                    visibility: Visibility::Private,
                    constant: true,
                    def: DeclDef::Present(GlobalVarDefBody { initializer: Some(constant) }),
                    ..
                } => *constant,
                _ => continue,
            };
            let expected_ty =
                super::types::get_memref_type(cx, cx[constant].ty, None, self.memory_space);
            if gv_decl.alignment != self.alignment || expected_ty != Ok(gv_decl.ty) {
                continue;
            }
            self.globals.entry(constant).or_insert(gv);
        }

        let num_seeded = self.globals.len() - num_globals_before;
        if num_seeded > 0 {
            tracing::debug!(num_seeded, "adopted existing constant globals");
        }
        num_seeded
    }

    /// Get (or create) the global holding `constant`, in `module`.
    pub fn get_global_for(
        &mut self,
        cx: &Context,
        module: &mut ModuleGlobalsMut<'_>,
        constant: Const,
    ) -> Result<GlobalVar, RewriteFailure> {
        if let Some(&gv) = self.globals.get(&constant) {
            // A pool is only ever valid for the module it created globals in.
            let name = module.global_vars.get(gv).map(|gv_decl| gv_decl.name);
            let found = name.and_then(|name| module.symbols.lookup(name));
            if found != Some(Symbol::GlobalVar(gv)) {
                return Err(BufferizeError::ForeignGlobalPool.into());
            }
            return Ok(gv);
        }

        let tensor_ty = cx[constant].ty;
        let memref_ty = super::types::get_memref_type(cx, tensor_ty, None, self.memory_space)?;

        let base_name = constant_symbol_base_name(cx, constant)?;
        let name = unique_symbol_name(cx, module, &base_name)?;

        let gv = module.global_vars.define(GlobalVarDecl {
            attrs: Default::default(),
            name,
            ty: memref_ty,
            visibility: Visibility::Private,
            constant: true,
            alignment: self.alignment,
            def: DeclDef::Present(GlobalVarDefBody { initializer: Some(constant) }),
        });
        module.symbols.insert(name, Symbol::GlobalVar(gv)).map_err(BufferizeError::from)?;
        self.globals.insert(constant, gv);

        tracing::debug!(symbol = &cx[name], "created global for tensor constant");
        Ok(gv)
    }
}

/// `__constant_` followed by the dimensions of the constant's type (each
/// followed by `x`, and `?` for dynamic ones) and its element type,
/// e.g. `__constant_2x3xf32`, or just `__constant_i64` for rank `0`.
fn constant_symbol_base_name(cx: &Context, constant: Const) -> Result<String, Precondition> {
    let (dims, elem) = match &cx[cx[constant].ty].kind {
        TypeKind::Tensor { shape: Shape::Ranked(dims), elem } => (dims, *elem),
        TypeKind::Tensor { shape: Shape::Unranked, .. } => return Err(Precondition::UnrankedType),
        TypeKind::Scalar(_) | TypeKind::MemRef { .. } => {
            return Err(Precondition::UnsupportedType);
        }
    };

    let mut name = String::from("__constant_");
    for dim in dims {
        match dim {
            Dim::Static(n) => name += &format!("{n}x"),
            Dim::Dynamic => name += "?x",
        }
    }
    name += &Printer::new(cx).type_to_string(elem);
    Ok(name)
}

fn unique_symbol_name(
    cx: &Context,
    module: &ModuleGlobalsMut<'_>,
    base_name: &str,
) -> Result<crate::InternedStr, BufferizeError> {
    let base = cx.intern(base_name);
    if !module.symbols.contains(base) {
        return Ok(base);
    }
    for attempt in 0..MAX_SYMBOL_DISAMBIGUATION_ATTEMPTS {
        let name = cx.intern(format!("{base_name}_{attempt}"));
        if !module.symbols.contains(name) {
            return Ok(name);
        }
    }
    Err(BufferizeError::SymbolCollision {
        base: base_name.to_string(),
        attempts: MAX_SYMBOL_DISAMBIGUATION_ATTEMPTS,
    })
}

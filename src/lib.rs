//! Bufferization of tensor-level IR: lowering value-semantic aggregates
//! ("tensors") to addressable, mutable memory ("memrefs").
//!
//! The core of this crate is *not* any single rewrite rule, but the framework
//! that lets any op kind (including ones defined by downstream crates) take
//! part in bufferization, through a [`BufferizableOpInterface`] model attached
//! to its [`OpName`] after the fact, in an [`OpInterfaceRegistry`].
//!
//! [`BufferizableOpInterface`]: bufferize::BufferizableOpInterface
//! [`OpName`]: dialect::OpName
//! [`OpInterfaceRegistry`]: bufferize::registry::OpInterfaceRegistry
//!
//! #### Notable types/modules
//!
//! ##### IR data types
// HACK(eddyb) using `(struct.Context.html)` to link `Context`, not `context::Context`.
//! * [`Context`](struct.Context.html): handles interning ([`Type`]s, [`Const`]s, etc.)
//!   and owns the installed op-interface registry
//! * [`Module`]: owns [`Func`]s and [`GlobalVar`]s (named through its [`SymbolTable`])
//! * [`FuncDefBody`]: owns [`DataInst`]s (ordered by [`insts`](FuncDefBody::insts))
//!
//! ##### Utilities and passes
//! * [`bufferize`]: the op-interface protocol, type conversion, constant pool
//!   and per-pass [`BufferizationState`](bufferize::state::BufferizationState)
//! * [`rewrite`]: pattern sets, the [`Rewriter`](rewrite::Rewriter), and a greedy driver
//! * [`passes::bufferize`]: ready-made bufferization passes (for op bodies)
//! * [`passes::func_bufferize`]: bufferization of function signatures and calls
//!

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE(eddyb) ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,

    // NOTE(eddyb) ignored because it's misguided to suggest `let mut s = ...;`
    // and `s.push_str(...);` when `+` is equivalent and does not require `let`.
    clippy::string_add,

    // FIXME(eddyb) rework doc comments to conform to linted expectations.
    clippy::too_long_first_doc_paragraph,
)]
// NOTE(eddyb) this is stronger than the "Embark standard lints" above, because
// we almost never need `unsafe` code and this is a further "speed bump" to it.
#![forbid(unsafe_code)]

// NOTE(eddyb) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod builder;
pub mod bufferize;
mod context;
pub mod dialect;
pub mod error;
pub mod func_at;
pub mod print;
pub mod rewrite;
pub mod visit;
pub mod passes {
    //! IR transformations (typically whole-[`Module`](crate::Module)).
    //
    // NOTE(eddyb) inline `mod` to avoid adding APIs here, it's just namespacing.

    pub mod bufferize;
    pub mod func_bufferize;
}

use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::rc::Rc;

// HACK(eddyb) work around the lack of `FxIndex{Map,Set}` type aliases elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
#[doc(hidden)]
type FxIndexSet<V> = indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// NOTE(eddyb) these reexports are all documented inside `context`.
pub use context::{
    Context, Entity, EntityDefs, EntityList, EntityListIter, EntityListNode, OpInterfacesState,
};

/// Interned handle for a [`str`].
pub use context::InternedStr;

// HACK(eddyb) this only serves to disallow modifying the `cx` field of `Module`.
#[doc(hidden)]
mod sealed {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone)]
    pub struct Module {
        /// Context used for everything interned, in this module.
        ///
        /// Notable choices made for this field:
        /// * private to disallow switching the context of a module
        /// * [`Rc`] sharing to allow multiple modules to use the same context
        ///   (`Context: !Sync` because of the interners so it can't be `Arc`)
        cx: Rc<Context>,

        pub global_vars: EntityDefs<GlobalVar>,
        pub funcs: EntityDefs<Func>,

        /// Every named [`GlobalVar`] and [`Func`] in this module.
        pub symbols: SymbolTable,
    }

    impl Module {
        pub fn new(cx: Rc<Context>) -> Self {
            Self {
                cx,

                global_vars: Default::default(),
                funcs: Default::default(),

                symbols: Default::default(),
            }
        }

        // FIXME(eddyb) `cx_ref` might be the better default in situations where
        // the module doesn't need to be modified, figure out if that's common.
        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }
    }
}
pub use sealed::Module;

impl Module {
    /// Define a new function named `name`, failing if the name is taken.
    pub fn define_func(&mut self, func_decl: FuncDecl) -> Result<Func, error::SymbolError> {
        let name = func_decl.name;
        if self.symbols.contains(name) {
            return Err(error::SymbolError::Redefinition(self.cx_ref()[name].to_string()));
        }
        let func = self.funcs.define(func_decl);
        self.symbols.insert(name, Symbol::Func(func))?;
        Ok(func)
    }

    /// Borrow everything module-level (other than `funcs`) mutably, alongside
    /// the body of `func`, so that both can be modified at the same time.
    pub fn split_func_def_body_mut(
        &mut self,
        func: Func,
    ) -> Option<(ModuleGlobalsMut<'_>, &mut FuncDefBody)> {
        let Module { global_vars, funcs, symbols, .. } = self;
        match &mut funcs[func].def {
            DeclDef::Present(func_def_body) => {
                Some((ModuleGlobalsMut { global_vars, symbols }, func_def_body))
            }
            DeclDef::Imported(_) => None,
        }
    }
}

/// Mutable access to the module-level state that rewrites of a function body
/// may need to touch (e.g. to declare new [`GlobalVar`]s).
pub struct ModuleGlobalsMut<'a> {
    pub global_vars: &'a mut EntityDefs<GlobalVar>,
    pub symbols: &'a mut SymbolTable,
}

/// A named module-level definition.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Symbol {
    GlobalVar(GlobalVar),
    Func(Func),
}

/// Mapping from symbol names to [`Symbol`]s, in insertion order.
#[derive(Clone, Default)]
pub struct SymbolTable {
    map: FxIndexMap<InternedStr, Symbol>,
}

impl SymbolTable {
    pub fn lookup(&self, name: InternedStr) -> Option<Symbol> {
        self.map.get(&name).copied()
    }

    pub fn contains(&self, name: InternedStr) -> bool {
        self.map.contains_key(&name)
    }

    /// Add `name => symbol`, which must not shadow an existing symbol.
    pub fn insert(&mut self, name: InternedStr, symbol: Symbol) -> Result<(), error::SymbolError> {
        match self.map.entry(name) {
            indexmap::map::Entry::Occupied(_) => {
                Err(error::SymbolError::Redefinition(format!("{name:?}")))
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(symbol);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InternedStr, Symbol)> + '_ {
        self.map.iter().map(|(&name, &symbol)| (name, symbol))
    }
}

/// Interned handle for an [`AttrSetDef`](crate::AttrSetDef)
/// (a set of [`Attr`](crate::Attr)s).
pub use context::AttrSet;

/// Definition for an [`AttrSet`]: a set of [`Attr`]s.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AttrSetDef {
    // FIXME(eddyb) consider "persistent datastructures" (e.g. the `im` crate).
    pub attrs: BTreeSet<Attr>,
}

impl AttrSetDef {
    pub fn diags(&self) -> &[Diag] {
        // HACK(eddyb) this assumes `Attr::Diagnostics` is the last of `Attr`!
        match self.attrs.last() {
            Some(Attr::Diagnostics(OrdAssertEq(diags))) => diags,
            _ => &[],
        }
    }

    pub fn mutate_diags(&mut self, f: impl FnOnce(&mut Vec<Diag>)) {
        // HACK(eddyb) this assumes `Attr::Diagnostics` is the last of `Attr`!
        let mut diags = match self.attrs.pop_last() {
            Some(Attr::Diagnostics(OrdAssertEq(diags))) => diags,
            Some(other) => {
                self.attrs.insert(other);
                vec![]
            }
            None => vec![],
        };
        f(&mut diags);
        self.attrs.insert(Attr::Diagnostics(OrdAssertEq(diags)));
    }

    // HACK(eddyb) this only exists to avoid changing code working with `AttrSetDef`s.
    pub fn push_diags(&mut self, new_diags: impl IntoIterator<Item = Diag>) {
        self.mutate_diags(|diags| diags.extend(new_diags));
    }
}

// FIXME(eddyb) should these methods be elsewhere?
impl AttrSet {
    // FIXME(eddyb) could these two methods have a better name?
    pub fn reintern_with(self, cx: &Context, f: impl FnOnce(&mut AttrSetDef)) -> Self {
        let mut new_attrs = AttrSetDef { attrs: cx[self].attrs.clone() };
        f(&mut new_attrs);
        cx.intern(new_attrs)
    }
    pub fn mutate(&mut self, cx: &Context, f: impl FnOnce(&mut AttrSetDef)) {
        *self = self.reintern_with(cx, f);
    }

    pub fn diags(self, cx: &Context) -> &[Diag] {
        cx[self].diags()
    }

    pub fn push_diags(&mut self, cx: &Context, diags: impl IntoIterator<Item = Diag>) {
        self.mutate(cx, |attrs| attrs.push_diags(diags));
    }

    pub fn push_diag(&mut self, cx: &Context, diag: Diag) {
        self.push_diags(cx, [diag]);
    }
}

/// Any semantic or non-semantic (debuginfo) decoration/modifier, that can be
/// *optionally* applied to some declaration/definition.
///
/// Always used via [`AttrSetDef`] (interned as [`AttrSet`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attr {
    /// Can be used anywhere to record [`Diag`]nostics produced during a pass,
    /// while allowing the pass to continue (and its output to be inspected).
    //
    // HACK(eddyb) this must be the last variant of `Attr` for the correctness
    // of`AttrSetDef::{diags,mutate_diags}`.
    Diagnostics(OrdAssertEq<Vec<Diag>>),
}

/// Diagnostics produced by passes, and recorded in [`Attr::Diagnostics`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Diag {
    pub level: DiagLevel,
    // FIXME(eddyb) this may want to be `SmallVec` and/or `Rc`?
    pub message: Vec<DiagMsgPart>,
}

impl Diag {
    pub fn new(level: DiagLevel, message: impl IntoIterator<Item = DiagMsgPart>) -> Self {
        Self { level, message: message.into_iter().collect() }
    }

    // FIMXE(eddyb) make macros more ergonomic than this, for interpolation.
    #[track_caller]
    pub fn bug(message: impl IntoIterator<Item = DiagMsgPart>) -> Self {
        Self::new(DiagLevel::Bug(std::panic::Location::caller()), message)
    }

    pub fn err(message: impl IntoIterator<Item = DiagMsgPart>) -> Self {
        Self::new(DiagLevel::Error, message)
    }

    pub fn warn(message: impl IntoIterator<Item = DiagMsgPart>) -> Self {
        Self::new(DiagLevel::Warning, message)
    }
}

/// The "severity" level of a [`Diag`]nostic.
///
/// Note: `Bug` diagnostics track their emission point for easier identification.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DiagLevel {
    Bug(&'static std::panic::Location<'static>),
    Error,
    Warning,
}

/// One part of a [`Diag`]nostic message, allowing rich interpolation.
#[derive(Clone, PartialEq, Eq, Hash, Debug, derive_more::From)]
// HACK(eddyb) this sets the default as "opt-out", to avoid `#[from(forward)]`
// on the `Plain` variant from making it "opt-in" for all variants.
#[from]
pub enum DiagMsgPart {
    #[from(forward)]
    Plain(Cow<'static, str>),

    Type(Type),
    Const(Const),
    OpName(dialect::OpName),
}

/// Wrapper to limit `Ord` for interned index types (e.g. [`InternedStr`])
/// to only situations where the interned index reflects contents (i.e. equality).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct OrdAssertEq<T>(pub T);

impl<T: Eq> PartialOrd for OrdAssertEq<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Ord for OrdAssertEq<T> {
    #[track_caller]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        assert!(
            self == other,
            "OrdAssertEq<{}>::cmp called with unequal values",
            std::any::type_name::<T>(),
        );
        std::cmp::Ordering::Equal
    }
}

/// Interned handle for a [`TypeDef`](crate::TypeDef).
pub use context::Type;

/// Definition for a [`Type`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDef {
    pub attrs: AttrSet,
    pub kind: TypeKind,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar(ScalarType),

    /// Value-semantic aggregate of `elem` values, i.e. with no identity
    /// or address, only contents (which can never change).
    Tensor { shape: Shape, elem: Type },

    /// Addressable and mutable memory holding `elem` values, laid out in memory
    /// according to `layout`, and allocated in the memory space `mem_space`.
    ///
    /// [`Shape::Unranked`] memrefs always have [`MemRefLayout::Identity`] as
    /// their `layout`, as no other layout can be expressed without a rank.
    MemRef { shape: Shape, elem: Type, layout: MemRefLayout, mem_space: MemorySpace },
}

// HACK(eddyb) this behaves like an implicit conversion for `cx.intern(...)`.
impl context::InternInCx<Type> for TypeKind {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeDef { attrs: Default::default(), kind: self })
    }
}

// HACK(eddyb) this behaves like an implicit conversion for `cx.intern(...)`.
impl context::InternInCx<Type> for ScalarType {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeKind::Scalar(self))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ScalarType {
    /// Signless integer of `width` bits.
    Int { width: u32 },

    /// Target-dependent integer used for sizes/indices.
    Index,

    Float { width: u32 },
}

impl ScalarType {
    pub const I1: Self = Self::Int { width: 1 };
    pub const I8: Self = Self::Int { width: 8 };
    pub const I32: Self = Self::Int { width: 32 };
    pub const I64: Self = Self::Int { width: 64 };
    pub const F32: Self = Self::Float { width: 32 };
    pub const F64: Self = Self::Float { width: 64 };
}

/// The "rank" (number of dimensions) and per-dimension sizes, if known.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Shape {
    Ranked(SmallVec<[Dim; 4]>),
    Unranked,
}

impl Shape {
    pub fn ranked(dims: impl IntoIterator<Item = Dim>) -> Self {
        Self::Ranked(dims.into_iter().collect())
    }

    /// Shorthand for a [`Shape::Ranked`] with only [`Dim::Static`] dimensions.
    pub fn fixed(dims: impl IntoIterator<Item = u64>) -> Self {
        Self::ranked(dims.into_iter().map(Dim::Static))
    }

    pub fn rank(&self) -> Option<usize> {
        match self {
            Self::Ranked(dims) => Some(dims.len()),
            Self::Unranked => None,
        }
    }

    /// Total number of elements, if every dimension is statically known.
    pub fn num_elements(&self) -> Option<u64> {
        match self {
            Self::Ranked(dims) => dims.iter().try_fold(1u64, |acc, dim| match *dim {
                Dim::Static(n) => acc.checked_mul(n),
                Dim::Dynamic => None,
            }),
            Self::Unranked => None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Dim {
    Static(u64),
    Dynamic,
}

/// How the elements of a [`TypeKind::MemRef`] are laid out in memory.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemRefLayout {
    /// Row-major, contiguous, starting at offset `0`.
    Identity,

    /// Element `[i_0, i_1, ...]` is at `offset + i_0 * strides[0] + i_1 * strides[1] + ...`
    /// (in units of elements, not bytes).
    Strided { offset: Dim, strides: SmallVec<[Dim; 4]> },
}

/// Memory space a [`TypeKind::MemRef`] is allocated in (`0` being the default).
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct MemorySpace(pub u32);

/// Interned handle for a [`ConstDef`](crate::ConstDef) (a constant value).
pub use context::Const;

/// Definition for a [`Const`]: a constant value.
///
/// As [`Const`]s are interned, two [`Const`]s are equal exactly when their
/// type *and* their contents are equal (i.e. "structural identity").
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConstDef {
    pub attrs: AttrSet,
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstKind {
    Scalar(ScalarLit),

    /// One element for every position of the (static) shape of `ty`,
    /// in row-major order.
    Dense(Rc<[ScalarLit]>),

    /// The same element repeated for every position of the shape of `ty`.
    Splat(ScalarLit),
}

/// Scalar constant, with floats kept as bits (to allow `Eq`/`Hash`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ScalarLit {
    Int(i64),
    FloatBits(u64),
}

impl From<f64> for ScalarLit {
    fn from(x: f64) -> Self {
        Self::FloatBits(x.to_bits())
    }
}

impl From<i64> for ScalarLit {
    fn from(x: i64) -> Self {
        Self::Int(x)
    }
}

/// Declarations ([`GlobalVarDecl`], [`FuncDecl`]) can contain a full definition,
/// or only be an import of a definition (e.g. from another module).
#[derive(Clone)]
pub enum DeclDef<D> {
    Imported(Import),
    Present(D),
}

/// An identifier (e.g. a link name, or "symbol") for an import declaration.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Import {
    LinkName(InternedStr),
}

/// Entity handle for a [`GlobalVarDecl`](crate::GlobalVarDecl) (a global variable).
pub use context::GlobalVar;

/// Declaration/definition for a [`GlobalVar`]: a module-level memory segment.
#[derive(Clone)]
pub struct GlobalVarDecl {
    pub attrs: AttrSet,

    /// Symbol name of this global (also present in the module's [`SymbolTable`]).
    pub name: InternedStr,

    /// The [`TypeKind::MemRef`] type of the memory backing this global
    /// (i.e. what `memref.get_global` returns when referring to it).
    pub ty: Type,

    pub visibility: Visibility,

    /// Whether the contents of the global may never be written to.
    pub constant: bool,

    /// Alignment (in bytes) of the memory segment, or `None` for the
    /// natural alignment of the element type.
    pub alignment: Option<NonZeroU32>,

    pub def: DeclDef<GlobalVarDefBody>,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Visibility {
    Public,
    Private,
}

/// The body of a [`GlobalVar`] definition.
#[derive(Clone)]
pub struct GlobalVarDefBody {
    /// If `Some`, the global variable will start out with the specified value.
    pub initializer: Option<Const>,
}

/// Entity handle for a [`FuncDecl`](crate::FuncDecl) (a function).
pub use context::Func;

/// Declaration/definition for a [`Func`]: a function.
#[derive(Clone)]
pub struct FuncDecl {
    pub attrs: AttrSet,

    /// Symbol name of this function (also present in the module's [`SymbolTable`]).
    pub name: InternedStr,

    pub ret_types: SmallVec<[Type; 1]>,

    pub params: SmallVec<[FuncParam; 2]>,

    pub def: DeclDef<FuncDefBody>,
}

#[derive(Copy, Clone)]
pub struct FuncParam {
    pub attrs: AttrSet,

    pub ty: Type,
}

/// The body of a [`Func`] definition.
//
// FIXME(eddyb) `FuncDefBody`/`func_def_body` are too long, find shorter names.
#[derive(Clone)]
pub struct FuncDefBody {
    /// Parameters of the function, accessed with [`Value::FuncParam`].
    ///
    /// Must always match the `params` of the [`FuncDecl`] owning this body.
    pub params: SmallVec<[FuncParam; 2]>,

    pub data_insts: EntityDefs<DataInst>,

    /// Execution order of the [`DataInst`]s of this function.
    ///
    /// [`DataInst`]s defined in `data_insts` but absent from this list are
    /// dead (e.g. replaced during a rewrite), and must not be used anymore.
    pub insts: EntityList<DataInst>,

    /// Values returned by the function.
    pub results: SmallVec<[Value; 1]>,
}

impl FuncDefBody {
    pub fn new(params: impl IntoIterator<Item = FuncParam>) -> Self {
        Self {
            params: params.into_iter().collect(),
            data_insts: Default::default(),
            insts: EntityList::empty(),
            results: SmallVec::new(),
        }
    }
}

/// Entity handle for a [`DataInstDef`](crate::DataInstDef) (a leaf instruction,
/// also referred to as an "op").
pub use context::DataInst;

/// Definition for a [`DataInst`]: a leaf (non-control-flow) instruction.
#[derive(Clone)]
pub struct DataInstDef {
    pub attrs: AttrSet,

    pub kind: DataInstKind,

    // FIXME(eddyb) change the inline size of this to fit most instructions.
    pub inputs: SmallVec<[Value; 2]>,

    pub output_type: Option<Type>,
}

/// The kind of a [`DataInst`], each variant being owned by some dialect
/// (see [`dialect`] for the op kinds known to this crate).
///
/// Anything dispatching on op kinds without knowing them in advance must
/// go through [`DataInstKind::op_name`], not `match` on this `enum`.
#[derive(Clone, PartialEq, Eq, Hash, derive_more::From)]
pub enum DataInstKind {
    // FIXME(eddyb) try to split this into recursive and non-recursive calls,
    // to avoid needing special handling for recursion where it's impossible.
    FuncCall(Func),

    /// `arith`-specific operations (see [`dialect::arith::ArithOp`]).
    Arith(dialect::arith::ArithOp),

    /// `memref`-specific operations (see [`dialect::memref::MemRefOp`]).
    MemRef(dialect::memref::MemRefOp),

    /// `bufferization`-specific operations (see [`dialect::bufferization::BufferizationOp`]).
    Bufferization(dialect::bufferization::BufferizationOp),

    /// Operation defined outside of this crate, known only by its name.
    Custom(dialect::OpName),
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    /// The `idx`th parameter of the function (see [`FuncDefBody::params`]).
    FuncParam { idx: u32 },

    /// The output value of a [`DataInst`].
    DataInstOutput(DataInst),
}

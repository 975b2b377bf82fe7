//! [`Context`] and related types/traits.

use crate::bufferize::BufferizableOpInterface;
use crate::dialect::OpName;
use crate::error::RegistryError;
use crate::{AttrSetDef, ConstDef, TypeDef, bufferize::registry::OpInterfaceRegistry};
use rustc_hash::FxHasher;
use std::cell::{Cell, RefCell};
use std::hash::{BuildHasherDefault, Hash};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Context object with global resources for the IR.
///
/// Those resources currently are:
/// * interners, for anything without an identity, and which can be deduplicated
/// * the installed [`OpInterfaceRegistry`], through which op kinds defined
///   anywhere can be dispatched to their [`BufferizableOpInterface`] model
//
// FIXME: consider intern/entity-allocate on separate `Context`s, to allow
// borrowing the interners while entity-allocating (at the cost of more plumbing).
pub struct Context {
    interners: Interners,

    op_interfaces: RefCell<OpInterfaceRegistry>,
    op_interfaces_state: Cell<OpInterfacesState>,
}

/// Lifecycle of the op-interface registry held by a [`Context`].
///
/// Registration must fully happen (`Empty` -> `Installed`) before the first
/// bufferization pass runs, which moves it to `Frozen` for good.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OpInterfacesState {
    Empty,
    Installed,
    Frozen,
}

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Dual-use trait for "interned-by-value" types, with `T: InternInCx<I>`
/// allowing `cx.intern(x: T)` to produce an interned `I`.
pub trait InternInCx<I> {
    #[doc(hidden)]
    fn intern_in_cx(self, cx: &Context) -> I;
}

impl Context {
    pub fn new() -> Self {
        let cx = Self {
            interners: Interners::default(),
            op_interfaces: RefCell::new(OpInterfaceRegistry::new()),
            op_interfaces_state: Cell::new(OpInterfacesState::Empty),
        };

        // HACK: `AttrSet::default()` relies on the empty set being
        // interned first, at index `0`.
        let empty_attrs: AttrSet = cx.intern(AttrSetDef::default());
        assert!(empty_attrs == AttrSet::default());

        cx
    }

    pub fn intern<T: InternInCx<I>, I>(&self, x: T) -> I {
        x.intern_in_cx(self)
    }

    /// Merge `registry` into the op-interface registry of this context.
    ///
    /// Fails if any op kind in `registry` already had a model installed, or
    /// if a bufferization pass already froze the registry.
    pub fn append_op_interfaces(&self, registry: OpInterfaceRegistry) -> Result<(), RegistryError> {
        if self.op_interfaces_state.get() == OpInterfacesState::Frozen {
            return Err(RegistryError::Frozen);
        }
        self.op_interfaces.borrow_mut().merge(self, registry)?;
        self.op_interfaces_state.set(OpInterfacesState::Installed);
        Ok(())
    }

    pub fn op_interfaces_state(&self) -> OpInterfacesState {
        self.op_interfaces_state.get()
    }

    /// Prevent any further [`append_op_interfaces`](Context::append_op_interfaces),
    /// returning `false` if nothing was ever installed.
    pub fn freeze_op_interfaces(&self) -> bool {
        match self.op_interfaces_state.get() {
            OpInterfacesState::Empty => false,
            OpInterfacesState::Installed | OpInterfacesState::Frozen => {
                self.op_interfaces_state.set(OpInterfacesState::Frozen);
                true
            }
        }
    }

    /// Find the [`BufferizableOpInterface`] model for `op_name`, if any.
    ///
    /// The model is returned by `Rc` so that no borrow of the registry is
    /// held while it runs (models routinely recurse back into lookups).
    pub fn lookup_op_interface(&self, op_name: OpName) -> Option<Rc<dyn BufferizableOpInterface>> {
        self.op_interfaces.borrow().lookup(op_name)
    }

    pub fn registered_op_names(&self) -> Vec<OpName> {
        self.op_interfaces.borrow().op_names().collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! interners {
    (
        $($name:ident $(default($default:expr))? => $ty:ty),+ $(,)?
    ) => {
        #[allow(non_snake_case)]
        #[derive(Default)]
        struct Interners {
            $($name: elsa::FrozenIndexSet<Box<$ty>, FxBuildHasher>,)*
        }

        $(
            // NOTE: never derive `PartialOrd, Ord` for these types, as
            // observing the interning order shouldn't be allowed.
            #[derive(Copy, Clone, PartialEq, Eq, Hash)]
            pub struct $name(u32);

            $(impl Default for $name {
                fn default() -> Self {
                    // HACK: this is a bit of a hack, but it's the only
                    // way to have a `Default` for interned types.
                    $name($default)
                }
            })?

            impl std::ops::Index<$name> for Context {
                type Output = $ty;

                fn index(&self, interned: $name) -> &Self::Output {
                    self.interners.$name.get_index(interned.0 as usize).unwrap()
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )*
    };
}

interners! {
    InternedStr => str,
    AttrSet default(0) => AttrSetDef,
    Type => TypeDef,
    Const => ConstDef,
}

impl InternInCx<InternedStr> for &'_ str {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        InternedStr(cx.interners.InternedStr.insert_full(self.into()).0.try_into().unwrap())
    }
}

impl InternInCx<InternedStr> for String {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        InternedStr(
            cx.interners.InternedStr.insert_full(self.into_boxed_str()).0.try_into().unwrap(),
        )
    }
}

impl InternInCx<AttrSet> for AttrSetDef {
    fn intern_in_cx(self, cx: &Context) -> AttrSet {
        AttrSet(cx.interners.AttrSet.insert_full(Box::new(self)).0.try_into().unwrap())
    }
}

impl InternInCx<Type> for TypeDef {
    fn intern_in_cx(self, cx: &Context) -> Type {
        Type(cx.interners.Type.insert_full(Box::new(self)).0.try_into().unwrap())
    }
}

impl InternInCx<Const> for ConstDef {
    fn intern_in_cx(self, cx: &Context) -> Const {
        Const(cx.interners.Const.insert_full(Box::new(self)).0.try_into().unwrap())
    }
}

/// Entity handles, which are allocated in an [`EntityDefs`] by their owner
/// (e.g. a [`Module`](crate::Module) for its [`GlobalVar`]s and [`Func`]s),
/// and are only meaningful in the context of that owner.
///
/// Unlike interned types, entities are never deduplicated, and have an
/// *identity* (i.e. two entities with identical definitions are still distinct).
pub trait Entity: Copy + Eq + Hash + 'static {
    type Def;

    #[doc(hidden)]
    fn from_idx(idx: u32) -> Self;
    #[doc(hidden)]
    fn idx(self) -> usize;
}

macro_rules! entities {
    ($($name:ident => $def:ty),+ $(,)?) => {
        $(
            #[derive(Copy, Clone, PartialEq, Eq, Hash)]
            pub struct $name(u32);

            impl Entity for $name {
                type Def = $def;

                fn from_idx(idx: u32) -> Self {
                    $name(idx)
                }
                fn idx(self) -> usize {
                    self.0 as usize
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )*
    };
}

entities! {
    GlobalVar => crate::GlobalVarDecl,
    Func => crate::FuncDecl,
    DataInst => EntityListNode<DataInst, crate::DataInstDef>,
}

/// Dense storage for the definitions of all entities of one kind in an owner.
///
/// Definitions are never physically removed: entities that are no longer
/// needed (e.g. a replaced [`DataInst`]) are merely unlinked from wherever
/// they were reachable from, so their handles are never reused.
pub struct EntityDefs<E: Entity> {
    defs: Vec<E::Def>,
    _marker: PhantomData<E>,
}

impl<E: Entity> Clone for EntityDefs<E>
where
    E::Def: Clone,
{
    fn clone(&self) -> Self {
        Self { defs: self.defs.clone(), _marker: PhantomData }
    }
}

impl<E: Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self { defs: vec![], _marker: PhantomData }
    }
}

impl<E: Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: E::Def) -> E {
        let entity = E::from_idx(self.defs.len().try_into().unwrap());
        self.defs.push(def);
        entity
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, entity: E) -> Option<&E::Def> {
        self.defs.get(entity.idx())
    }

    pub fn iter(&self) -> impl Iterator<Item = (E, &E::Def)> + '_ {
        self.defs.iter().enumerate().map(|(i, def)| (E::from_idx(i as u32), def))
    }

    pub fn keys(&self) -> impl Iterator<Item = E> + use<E> {
        (0..self.defs.len() as u32).map(E::from_idx)
    }
}

impl<E: Entity> std::ops::Index<E> for EntityDefs<E> {
    type Output = E::Def;

    fn index(&self, entity: E) -> &Self::Output {
        &self.defs[entity.idx()]
    }
}

impl<E: Entity> std::ops::IndexMut<E> for EntityDefs<E> {
    fn index_mut(&mut self, entity: E) -> &mut Self::Output {
        &mut self.defs[entity.idx()]
    }
}

/// Doubly-linked list, "intrusively" going through `E::Def`, which must be an
/// [`EntityListNode<E, _>`] (to hold the "previous/next node" links).
///
/// Fields are private to avoid arbitrary user interactions.
#[derive(Copy, Clone, Default)]
pub struct EntityList<E: Entity>(Option<FirstLast<E, E>>);

// HACK: this only exists to give field names to a non-empty list.
#[derive(Copy, Clone)]
struct FirstLast<F, L> {
    first: F,
    last: L,
}

impl<E: Entity<Def = EntityListNode<E, D>>, D> EntityList<E> {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    pub fn iter(self) -> EntityListIter<E> {
        EntityListIter { first: self.0.map(|list| list.first), last: self.0.map(|list| list.last) }
    }

    /// Insert `new_node` (defined in `defs`) at the end of `self`.
    #[track_caller]
    pub fn insert_last(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_last: new node already linked into a (different?) list"
        );

        new_node_def.prev = self.0.map(|this| this.last);
        if let Some(old_last) = new_node_def.prev {
            let old_last_def = &mut defs[old_last];

            // FIXME: this situation should be impossible anyway, as it
            // involves the `EntityListNode`s links, which should be unexported.
            assert!(old_last_def.next.is_none(), "invalid EntityList: `last->next != None`");

            old_last_def.next = Some(new_node);
        }

        self.0 = Some(FirstLast {
            first: self.0.map_or(new_node, |this| this.first),
            last: new_node,
        });
    }

    /// Insert `new_node` (defined in `defs`) into `self`, before `next`.
    #[track_caller]
    pub fn insert_before(&mut self, new_node: E, next: E, defs: &mut EntityDefs<E>) {
        let prev = defs[next].prev.replace(new_node);

        let new_node_def = &mut defs[new_node];
        assert!(
            new_node_def.prev.is_none() && new_node_def.next.is_none(),
            "EntityList::insert_before: new node already linked into a (different?) list"
        );

        new_node_def.prev = prev;
        new_node_def.next = Some(next);

        match prev {
            Some(prev) => {
                let old_prev_next = defs[prev].next.replace(new_node);

                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unexported.
                assert!(
                    old_prev_next == Some(next),
                    "invalid EntityListNode: `node->prev->next != node`"
                );
            }
            None => {
                // FIXME: this situation should be impossible anyway, as it
                // involves the `EntityListNode`s links, which should be unexported.
                assert!(
                    self.0.map(|this| this.first) == Some(next),
                    "invalid EntityList: `node->prev == None` but `node != first`"
                );

                if let Some(this) = &mut self.0 {
                    this.first = new_node;
                }
            }
        }
    }

    /// Remove `node` (defined in `defs`) from `self`.
    #[track_caller]
    pub fn remove(&mut self, node: E, defs: &mut EntityDefs<E>) {
        // Unlink `node->{prev,next}` first (also allowing re-insertion elsewhere).
        let (prev, next) = {
            let node_def = &mut defs[node];
            (node_def.prev.take(), node_def.next.take())
        };

        // Unlink `prev->next = node` (or validate `first = node`).
        match prev {
            Some(prev) => {
                let prev_next = std::mem::replace(&mut defs[prev].next, next);
                assert!(
                    prev_next == Some(node),
                    "invalid EntityListNode: `node->prev->next != node`"
                );
            }
            None => {
                assert!(
                    self.0.map(|this| this.first) == Some(node),
                    "invalid EntityList: `node->prev == None` but `node != first`"
                );
            }
        }

        // Unlink `next->prev = node` (or validate `last = node`).
        match next {
            Some(next) => {
                let next_prev = std::mem::replace(&mut defs[next].prev, prev);
                assert!(
                    next_prev == Some(node),
                    "invalid EntityListNode: `node->next->prev != node`"
                );
            }
            None => {
                assert!(
                    self.0.map(|this| this.last) == Some(node),
                    "invalid EntityList: `node->next == None` but `node != last`"
                );
            }
        }

        // Update list end-points (overwritten `first`/`last` validated above).
        match (prev, next) {
            (Some(_), Some(_)) => {}
            (None, None) => self.0 = None,
            (None, Some(next)) => {
                if let Some(this) = &mut self.0 {
                    this.first = next;
                }
            }
            (Some(prev), None) => {
                if let Some(this) = &mut self.0 {
                    this.last = prev;
                }
            }
        }
    }
}

/// [`EntityList<E>`] iterator, but with a different API than [`Iterator`].
///
/// This can also be considered a (non-random-access) "subslice" of the list.
#[derive(Copy, Clone)]
pub struct EntityListIter<E: Entity> {
    pub first: Option<E>,
    pub last: Option<E>,
}

impl<E: Entity<Def = EntityListNode<E, D>>, D> EntityListIter<E> {
    #[track_caller]
    pub fn split_first(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = first?;
        let next = defs[current].next;
        match next {
            // FIXME: this situation should be impossible anyway, as it
            // involves the `EntityListNode`s links, which should be unexported.
            Some(next) => assert!(
                defs[next].prev == Some(current),
                "invalid EntityListNode: `node->next->prev != node`"
            ),

            None => assert!(
                Some(current) == last,
                "invalid EntityListIter: `first->next->...->next != last`"
            ),
        }
        let rest = if Some(current) == last {
            Self { first: None, last: None }
        } else {
            Self { first: next, last }
        };
        Some((current, rest))
    }

    #[track_caller]
    pub fn split_last(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = last?;
        let prev = defs[current].prev;
        match prev {
            // FIXME: this situation should be impossible anyway, as it
            // involves the `EntityListNode`s links, which should be unexported.
            Some(prev) => assert!(
                defs[prev].next == Some(current),
                "invalid EntityListNode: `node->prev->next != node`"
            ),

            None => assert!(
                Some(current) == first,
                "invalid EntityListIter: `last->prev->...->prev != first`"
            ),
        }
        let rest = if Some(current) == first {
            Self { first: None, last: None }
        } else {
            Self { first, last: prev }
        };
        Some((current, rest))
    }

    /// Collect the remaining entities, e.g. to allow mutating the list while
    /// still visiting every entity that was in it when this was called.
    pub fn collect_in(mut self, defs: &EntityDefs<E>) -> Vec<E> {
        let mut entities = vec![];
        while let Some((current, rest)) = self.split_first(defs) {
            entities.push(current);
            self = rest;
        }
        entities
    }
}

/// [`Entity`] definition, wrapped in an [`EntityListNode`] (i.e. with "links")
/// to allow it to be part of an [`EntityList`].
#[derive(Clone)]
pub struct EntityListNode<E: Entity, D> {
    prev: Option<E>,
    next: Option<E>,

    inner_def: D,
}

impl<E: Entity, D> From<D> for EntityListNode<E, D> {
    fn from(inner_def: D) -> Self {
        Self { prev: None, next: None, inner_def }
    }
}

impl<E: Entity, D> EntityListNode<E, D> {
    pub fn prev_in_list(&self) -> Option<E> {
        self.prev
    }
    pub fn next_in_list(&self) -> Option<E> {
        self.next
    }
}

impl<E: Entity, D> Deref for EntityListNode<E, D> {
    type Target = D;
    fn deref(&self) -> &D {
        &self.inner_def
    }
}

impl<E: Entity, D> DerefMut for EntityListNode<E, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.inner_def
    }
}

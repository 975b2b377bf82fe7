//! Op-kind-keyed table of [`BufferizableOpInterface`] models.

use super::BufferizableOpInterface;
use crate::dialect::OpName;
use crate::error::RegistryError;
use crate::{Context, FxIndexMap};
use std::rc::Rc;

/// At most one [`BufferizableOpInterface`] model per [`OpName`].
///
/// Built up independently (e.g. by each dialect's registration function),
/// then installed with [`Context::append_op_interfaces`].
#[derive(Clone, Default)]
pub struct OpInterfaceRegistry {
    models: FxIndexMap<OpName, Rc<dyn BufferizableOpInterface>>,
}

impl OpInterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `model` to the op kind `op_name`, which must not already have one.
    pub fn register(
        &mut self,
        cx: &Context,
        op_name: OpName,
        model: impl BufferizableOpInterface + 'static,
    ) -> Result<(), RegistryError> {
        self.insert(cx, op_name, Rc::new(model))
    }

    fn insert(
        &mut self,
        cx: &Context,
        op_name: OpName,
        model: Rc<dyn BufferizableOpInterface>,
    ) -> Result<(), RegistryError> {
        match self.models.entry(op_name) {
            indexmap::map::Entry::Occupied(_) => {
                Err(RegistryError::DuplicateModel(op_name.as_str(cx).to_string()))
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(model);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, op_name: OpName) -> Option<Rc<dyn BufferizableOpInterface>> {
        self.models.get(&op_name).cloned()
    }

    pub fn contains(&self, op_name: OpName) -> bool {
        self.models.contains_key(&op_name)
    }

    /// All op kinds with a model, in registration order.
    pub fn op_names(&self) -> impl Iterator<Item = OpName> + '_ {
        self.models.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Move all models from `other` into `self`, failing (without changing
    /// `self`) if any op kind would end up with two models.
    pub fn merge(&mut self, cx: &Context, other: OpInterfaceRegistry) -> Result<(), RegistryError> {
        if let Some(&dup) = other.models.keys().find(|op_name| self.contains(**op_name)) {
            return Err(RegistryError::DuplicateModel(dup.as_str(cx).to_string()));
        }
        for (op_name, model) in other.models {
            self.insert(cx, op_name, model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataInst;
    use crate::bufferize::state::BufferizationState;
    use crate::error::{Precondition, RewriteFailure};
    use crate::rewrite::Rewriter;

    struct Inert;

    impl BufferizableOpInterface for Inert {
        fn bufferize(
            &self,
            _: &mut Rewriter<'_>,
            _: DataInst,
            _: &mut BufferizationState,
        ) -> Result<(), RewriteFailure> {
            Err(Precondition::NoMatch.into())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let cx = Context::new();
        let name = OpName::new(&cx, "test.op");

        let mut registry = OpInterfaceRegistry::new();
        registry.register(&cx, name, Inert).unwrap();
        assert_eq!(
            registry.register(&cx, name, Inert),
            Err(RegistryError::DuplicateModel("test.op".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let cx = Context::new();
        let [a, b, c] = ["test.a", "test.b", "test.c"].map(|name| OpName::new(&cx, name));

        let mut base = OpInterfaceRegistry::new();
        base.register(&cx, b, Inert).unwrap();

        let mut other = OpInterfaceRegistry::new();
        other.register(&cx, a, Inert).unwrap();
        other.register(&cx, b, Inert).unwrap();
        assert!(base.merge(&cx, other).is_err());
        assert_eq!(base.op_names().collect::<Vec<_>>(), [b]);

        let mut other = OpInterfaceRegistry::new();
        other.register(&cx, c, Inert).unwrap();
        other.register(&cx, a, Inert).unwrap();
        base.merge(&cx, other).unwrap();
        assert_eq!(base.op_names().collect::<Vec<_>>(), [b, c, a]);
        assert!(base.lookup(OpName::new(&cx, "test.d")).is_none());
    }
}

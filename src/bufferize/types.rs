//! Tensor to memref type conversion.

use super::options::BufferizationOptions;
use crate::error::Precondition;
use crate::func_at::FuncAt;
use crate::{Context, DataInst, MemRefLayout, MemorySpace, Shape, Type, TypeKind};

/// Memref type holding the contents of the (ranked) tensor type `tensor_ty`,
/// with the given `layout` (identity by default) and memory space.
pub fn get_memref_type(
    cx: &Context,
    tensor_ty: Type,
    layout: Option<MemRefLayout>,
    mem_space: MemorySpace,
) -> Result<Type, Precondition> {
    match &cx[tensor_ty].kind {
        TypeKind::Tensor { shape: shape @ Shape::Ranked(dims), elem } => {
            let layout = layout.unwrap_or(MemRefLayout::Identity);
            if let MemRefLayout::Strided { strides, .. } = &layout {
                if strides.len() != dims.len() {
                    return Err(Precondition::UnsupportedType);
                }
            }
            Ok(cx.intern(TypeKind::MemRef { shape: shape.clone(), elem: *elem, layout, mem_space }))
        }
        TypeKind::Tensor { shape: Shape::Unranked, .. } => Err(Precondition::UnrankedType),
        TypeKind::Scalar(_) | TypeKind::MemRef { .. } => Err(Precondition::UnsupportedType),
    }
}

/// Type conversion for bufferization, parameterized by [`BufferizationOptions`].
///
/// Fresh buffers (e.g. for globals, or materialized from unknown producers)
/// get the identity layout and the default memory space of the options,
/// while buffers derived from an existing buffer should go through
/// [`convert_like`](Self::convert_like) instead.
#[derive(Clone, Default)]
pub struct BufferizeTypeConverter {
    options: BufferizationOptions,
}

impl BufferizeTypeConverter {
    pub fn new(options: BufferizationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BufferizationOptions {
        &self.options
    }

    /// Convert a tensor type, with `layout`/`mem_space` overriding the defaults.
    pub fn convert_tensor_type(
        &self,
        cx: &Context,
        tensor_ty: Type,
        layout: Option<MemRefLayout>,
        mem_space: Option<MemorySpace>,
    ) -> Result<Type, Precondition> {
        let mem_space = mem_space.unwrap_or(MemorySpace(self.options.default_memory_space));
        get_memref_type(cx, tensor_ty, layout, mem_space)
    }

    /// Convert a tensor type, taking layout and memory space from the memref
    /// type `reference_buffer_ty` (e.g. that of a buffer being reinterpreted).
    pub fn convert_like(
        &self,
        cx: &Context,
        tensor_ty: Type,
        reference_buffer_ty: Type,
    ) -> Result<Type, Precondition> {
        match &cx[reference_buffer_ty].kind {
            TypeKind::MemRef { layout, mem_space, .. } => {
                self.convert_tensor_type(cx, tensor_ty, Some(layout.clone()), Some(*mem_space))
            }
            TypeKind::Scalar(_) | TypeKind::Tensor { .. } => Err(Precondition::UnsupportedType),
        }
    }

    /// Convert any type, leaving non-tensor types unchanged.
    pub fn convert_type(&self, cx: &Context, ty: Type) -> Result<Type, Precondition> {
        match cx[ty].kind {
            TypeKind::Tensor { .. } => self.convert_tensor_type(cx, ty, None, None),
            TypeKind::Scalar(_) | TypeKind::MemRef { .. } => Ok(ty),
        }
    }

    pub fn is_legal_type(&self, cx: &Context, ty: Type) -> bool {
        !matches!(cx[ty].kind, TypeKind::Tensor { .. })
    }

    /// Whether the op is already free of tensor types.
    pub fn is_legal_op(&self, cx: &Context, func_at_inst: FuncAt<'_, DataInst>) -> bool {
        !super::has_tensor_semantics(cx, func_at_inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dim, ScalarType};
    use smallvec::smallvec;

    fn tensor(cx: &Context, shape: Shape, elem: ScalarType) -> Type {
        cx.intern(TypeKind::Tensor { shape, elem: cx.intern(elem) })
    }

    #[test]
    fn ranked_tensor_to_identity_memref() {
        let cx = Context::new();
        let converter = BufferizeTypeConverter::default();
        let ty = tensor(&cx, Shape::ranked([Dim::Static(2), Dim::Dynamic]), ScalarType::F32);

        let memref = converter.convert_type(&cx, ty).unwrap();
        assert!(
            cx[memref].kind
                == TypeKind::MemRef {
                    shape: Shape::ranked([Dim::Static(2), Dim::Dynamic]),
                    elem: cx.intern(ScalarType::F32),
                    layout: MemRefLayout::Identity,
                    mem_space: MemorySpace(0),
                }
        );

        // Conversion is pure, so it always produces the same interned type.
        assert_eq!(converter.convert_type(&cx, ty).unwrap(), memref);
    }

    #[test]
    fn unranked_and_non_tensor_types() {
        let cx = Context::new();
        let converter = BufferizeTypeConverter::default();

        let unranked = tensor(&cx, Shape::Unranked, ScalarType::I32);
        assert_eq!(
            converter.convert_tensor_type(&cx, unranked, None, None),
            Err(Precondition::UnrankedType)
        );

        let i32_ty = cx.intern(ScalarType::I32);
        assert_eq!(
            converter.convert_tensor_type(&cx, i32_ty, None, None),
            Err(Precondition::UnsupportedType)
        );
        assert_eq!(converter.convert_type(&cx, i32_ty), Ok(i32_ty));
        assert!(converter.is_legal_type(&cx, i32_ty));
        assert!(!converter.is_legal_type(&cx, unranked));
    }

    #[test]
    fn default_memory_space_only_for_fresh_buffers() {
        let cx = Context::new();
        let converter = BufferizeTypeConverter::new(BufferizationOptions {
            default_memory_space: 3,
            ..Default::default()
        });
        let ty = tensor(&cx, Shape::fixed([4]), ScalarType::Index);

        let fresh = converter.convert_type(&cx, ty).unwrap();
        assert!(matches!(cx[fresh].kind, TypeKind::MemRef { mem_space: MemorySpace(3), .. }));

        let strided =
            MemRefLayout::Strided { offset: Dim::Dynamic, strides: smallvec![Dim::Static(2)] };
        let reference = get_memref_type(&cx, ty, Some(strided.clone()), MemorySpace(1)).unwrap();
        let derived_from = tensor(&cx, Shape::fixed([4]), ScalarType::I64);
        let derived = converter.convert_like(&cx, derived_from, reference).unwrap();
        match &cx[derived].kind {
            TypeKind::MemRef { layout, mem_space, .. } => {
                assert!(*layout == strided);
                assert_eq!(*mem_space, MemorySpace(1));
            }
            _ => unreachable!(),
        }
    }
}

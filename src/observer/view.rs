//! Object views: typed windows over mapped instance bytes

use crate::error::{MemglassError, Result};

use super::{FieldProxy, ObservedType};

/// A view over one object instance, bound to its mapped address and type
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    base: *const u8,
    ty: &'a ObservedType,
}

impl<'a> ObjectView<'a> {
    pub(crate) fn new(base: *const u8, ty: &'a ObservedType) -> Self {
        Self { base, ty }
    }

    /// The type descriptor backing this view
    pub fn type_info(&self) -> &'a ObservedType {
        self.ty
    }

    /// Mapped address of the instance (for diagnostics)
    pub fn address(&self) -> *const u8 {
        self.base
    }

    /// Resolve a field by its full dotted path.
    ///
    /// `view.field("a")?.field("b")?` is equivalent to `view.field("a.b")?`
    /// when the registrar emitted a nested marker entry for `a`.
    pub fn field(&self, path: &str) -> Result<FieldProxy<'a>> {
        let field = self
            .ty
            .field(path)
            .ok_or_else(|| MemglassError::invalid_field(path))?;
        Ok(FieldProxy::new(self.base, self.ty, field))
    }
}

//! The in-memory object graph consumed by the directory builder.
//!
//! A [`Module`] owns arenas of definitions and references; everything else
//! points into those arenas through copyable handles. A handle carries the
//! identity of its owning module, which is what the builder's ownership
//! assertion compares when a member is imported.

mod members;
mod module;
mod signature;
mod types;

pub use members::{
    Constant, CustomAttribute, CustomAttributeCtor, FieldDef, MemberRef, MemberRefSignature,
    MethodDef, MethodSpecDef, PInvokeMap, ParamDef, SecurityDeclaration, StandAloneSig,
    StandAloneSignature,
};
pub use module::{
    AssemblyDef, AssemblyRef, EntryPoint, FileDef, HASH_ALG_SHA1, ManifestResource, Module,
    ModuleRefDef, ResourceData,
};
pub use signature::{
    CallingConvention, ElementType, FieldSignature, LocalVariablesSignature, MethodSignature,
    MethodSpecSignature, PropertySignature, TypeSignature, TypeTokenResolver,
};
pub use types::{
    ClassLayout, Event, ExportedTypeDef, ExportedTypeImpl, GenericParam, MethodImplDef, Property,
    TypeDef, TypeRef, TypeSpec,
};

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a module object graph.
///
/// Stable for the lifetime of the module value, used for ownership
/// assertions when members are imported into a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u64);

impl ModuleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! define_handle {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) module: ModuleId,
            pub(crate) index: u32,
        }

        impl $name {
            /// Identity of the module that owns the referenced object.
            #[must_use]
            pub fn module(self) -> ModuleId {
                self.module
            }
        }
    };
}

define_handle!(
    /// Handle to a type definition in a module.
    TypeDefId
);
define_handle!(
    /// Handle to a type reference in a module.
    TypeRefId
);
define_handle!(
    /// Handle to a type specification in a module.
    TypeSpecId
);
define_handle!(
    /// Handle to a method definition in a module.
    MethodDefId
);
define_handle!(
    /// Handle to a field definition in a module.
    FieldId
);
define_handle!(
    /// Handle to a member reference in a module.
    MemberRefId
);
define_handle!(
    /// Handle to a method specification in a module.
    MethodSpecId
);
define_handle!(
    /// Handle to a module reference in a module.
    ModuleRefId
);
define_handle!(
    /// Handle to an assembly reference in a module.
    AssemblyRefId
);
define_handle!(
    /// Handle to a file record in a module.
    FileId
);
define_handle!(
    /// Handle to an exported-type record in a module.
    ExportedTypeId
);
define_handle!(
    /// Handle to a stand-alone signature in a module.
    StandAloneSigId
);

/// A reference to a type: definition, reference, or specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDefOrRef {
    /// A type defined in this module.
    Def(TypeDefId),
    /// A type defined elsewhere.
    Ref(TypeRefId),
    /// An instantiated or otherwise constructed type.
    Spec(TypeSpecId),
}

impl TypeDefOrRef {
    /// Identity of the module that owns the referenced object.
    #[must_use]
    pub fn module(self) -> ModuleId {
        match self {
            Self::Def(h) => h.module(),
            Self::Ref(h) => h.module(),
            Self::Spec(h) => h.module(),
        }
    }
}

/// A reference to a method: definition or member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodDefOrRef {
    /// A method defined in this module.
    Def(MethodDefId),
    /// A method defined elsewhere.
    Ref(MemberRefId),
}

/// The scope a type reference resolves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionScopeRef {
    /// The current module.
    Module,
    /// Another module of the same assembly.
    ModuleRef(ModuleRefId),
    /// Another assembly.
    AssemblyRef(AssemblyRefId),
    /// The enclosing type, for nested type references.
    TypeRef(TypeRefId),
}

/// The parent of a member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRefParent {
    /// A type (definition, reference, or specification).
    Type(TypeDefOrRef),
    /// A module reference, for global members of another module.
    ModuleRef(ModuleRefId),
    /// A method definition, for vararg call-site references.
    MethodDef(MethodDefId),
}

/// A metadata item a CIL operand can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    /// A type, for `ldtoken`, `box`, `isinst`, `castclass`, ...
    Type(TypeDefOrRef),
    /// A method defined in this module.
    MethodDef(MethodDefId),
    /// A field defined in this module.
    FieldDef(FieldId),
    /// A member (method or field) defined elsewhere.
    MemberRef(MemberRefId),
    /// An instantiated generic method.
    MethodSpec(MethodSpecId),
    /// A stand-alone signature, for `calli`.
    Signature(StandAloneSigId),
}

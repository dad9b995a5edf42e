//! Type definitions, references, and the records that hang off types.

use crate::attributes::{
    EventAttributes, GenericParamAttributes, PropertyAttributes, TypeAttributes,
};
use crate::model::{
    AssemblyRefId, Constant, CustomAttribute, ExportedTypeId, FileId, MethodDefId, MethodDefOrRef,
    PropertySignature, ResolutionScopeRef, SecurityDeclaration, TypeDefId, TypeDefOrRef,
    TypeSignature,
};

/// Explicit layout information for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    /// Field packing alignment.
    pub packing_size: u16,
    /// Total size of the type in bytes.
    pub class_size: u32,
}

/// A generic parameter declared by a type or method.
#[derive(Debug, Clone)]
pub struct GenericParam {
    /// 0-based position in the owner's parameter list.
    pub number: u16,
    /// Variance and constraint flags.
    pub attributes: GenericParamAttributes,
    /// Parameter name.
    pub name: String,
    /// Constraint types.
    pub constraints: Vec<TypeDefOrRef>,
    /// Custom attributes on the parameter.
    pub custom_attributes: Vec<CustomAttribute>,
}

impl GenericParam {
    /// Create a generic parameter at the given position.
    #[must_use]
    pub fn new(number: u16, name: impl Into<String>) -> Self {
        Self {
            number,
            attributes: GenericParamAttributes::empty(),
            name: name.into(),
            constraints: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }
}

/// A property declared by a type.
#[derive(Debug, Clone)]
pub struct Property {
    /// Property attributes.
    pub attributes: PropertyAttributes,
    /// Property name.
    pub name: String,
    /// Property signature.
    pub signature: PropertySignature,
    /// Getter method, if any.
    pub getter: Option<MethodDefId>,
    /// Setter method, if any.
    pub setter: Option<MethodDefId>,
    /// Other associated methods.
    pub other_methods: Vec<MethodDefId>,
    /// Default value, if any.
    pub constant: Option<Constant>,
    /// Custom attributes on the property.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// An event declared by a type.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event attributes.
    pub attributes: EventAttributes,
    /// Event name.
    pub name: String,
    /// The delegate type of the event.
    pub event_type: TypeDefOrRef,
    /// Add accessor, if any.
    pub add_method: Option<MethodDefId>,
    /// Remove accessor, if any.
    pub remove_method: Option<MethodDefId>,
    /// Raise accessor, if any.
    pub raise_method: Option<MethodDefId>,
    /// Other associated methods.
    pub other_methods: Vec<MethodDefId>,
    /// Custom attributes on the event.
    pub custom_attributes: Vec<CustomAttribute>,
}

/// An explicit interface-method implementation.
#[derive(Debug, Clone, Copy)]
pub struct MethodImplDef {
    /// The implementing method.
    pub body: MethodDefOrRef,
    /// The declaration being implemented.
    pub declaration: MethodDefOrRef,
}

/// A type definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Type attributes.
    pub attributes: TypeAttributes,
    /// Type name.
    pub name: String,
    /// Type namespace ("" for the global namespace).
    pub namespace: String,
    /// Base type, if any.
    pub extends: Option<TypeDefOrRef>,
    /// Fields, in declaration order.
    pub fields: Vec<crate::model::FieldId>,
    /// Methods, in declaration order.
    pub methods: Vec<MethodDefId>,
    /// Properties, in declaration order.
    pub properties: Vec<Property>,
    /// Events, in declaration order.
    pub events: Vec<Event>,
    /// Implemented interfaces.
    pub interfaces: Vec<TypeDefOrRef>,
    /// Generic parameters declared by the type.
    pub generic_params: Vec<GenericParam>,
    /// Explicit interface-method implementations.
    pub method_impls: Vec<MethodImplDef>,
    /// Explicit layout, if any.
    pub class_layout: Option<ClassLayout>,
    /// Enclosing type for nested types.
    pub enclosing_type: Option<TypeDefId>,
    /// Custom attributes on the type.
    pub custom_attributes: Vec<CustomAttribute>,
    /// Declarative security on the type.
    pub security_declarations: Vec<SecurityDeclaration>,
}

impl TypeDef {
    /// Create a type definition.
    #[must_use]
    pub fn new(
        attributes: TypeAttributes,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            rid: 0,
            attributes,
            name: name.into(),
            namespace: namespace.into(),
            extends: None,
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            method_impls: Vec::new(),
            class_layout: None,
            enclosing_type: None,
            custom_attributes: Vec::new(),
            security_declarations: Vec::new(),
        }
    }
}

/// A reference to a type defined elsewhere.
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// The scope the reference resolves in.
    pub scope: ResolutionScopeRef,
    /// Type name.
    pub name: String,
    /// Type namespace ("" for the global namespace).
    pub namespace: String,
}

impl TypeRef {
    /// Create a type reference.
    #[must_use]
    pub fn new(
        scope: ResolutionScopeRef,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            rid: 0,
            scope,
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// A type specification: a constructed type with its own signature blob.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// The constructed type.
    pub signature: TypeSignature,
}

/// The implementation a forwarded type resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportedTypeImpl {
    /// A file of this assembly.
    File(FileId),
    /// Another assembly.
    AssemblyRef(AssemblyRefId),
    /// The enclosing exported type, for nested forwarded types.
    ExportedType(ExportedTypeId),
}

/// A type exported from this assembly but defined in another file or
/// forwarded to another assembly.
#[derive(Debug, Clone)]
pub struct ExportedTypeDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Type attributes.
    pub attributes: TypeAttributes,
    /// TypeDef RID hint within the file that defines the type.
    pub type_def_id: u32,
    /// Type name.
    pub name: String,
    /// Type namespace.
    pub namespace: String,
    /// Where the definition lives.
    pub implementation: ExportedTypeImpl,
    /// Custom attributes on the exported type.
    pub custom_attributes: Vec<CustomAttribute>,
}

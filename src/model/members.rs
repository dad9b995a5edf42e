//! Member definitions and references: fields, methods, params, and the
//! reference shapes that point outside the module.

use crate::attributes::{
    FieldAttributes, MethodAttributes, MethodImplAttributes, PInvokeAttributes, ParamAttributes,
};
use crate::cil::MethodBody;
use crate::model::{
    ElementType, FieldSignature, GenericParam, LocalVariablesSignature, MemberRefParent,
    MethodDefOrRef, MethodSignature, MethodSpecSignature, ModuleRefId,
};

/// A compile-time constant attached to a field, param, or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    /// Element type of the value (one of the primitive codes, or Class for
    /// null reference constants).
    pub element_type: ElementType,
    /// The raw little-endian value bytes.
    pub value: Vec<u8>,
}

/// A custom attribute instance: a constructor plus its raw value blob.
///
/// The value blob is carried opaque; the builder fixes up the constructor
/// reference only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAttribute {
    /// The attribute type's constructor.
    pub ctor: CustomAttributeCtor,
    /// Raw value blob (prolog, fixed args, named args).
    pub value: Vec<u8>,
}

/// The constructor of a custom attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomAttributeCtor {
    /// A constructor defined in this module.
    MethodDef(crate::model::MethodDefId),
    /// A constructor defined elsewhere.
    MemberRef(crate::model::MemberRefId),
}

/// A declarative security attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDeclaration {
    /// Security action code.
    pub action: u16,
    /// The raw permission set blob.
    pub permission_set: Vec<u8>,
}

/// A P/Invoke mapping for a method or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PInvokeMap {
    /// Mapping flags.
    pub attributes: PInvokeAttributes,
    /// Name of the imported symbol.
    pub import_name: String,
    /// The module the symbol is imported from.
    pub import_scope: ModuleRefId,
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Field attributes.
    pub attributes: FieldAttributes,
    /// Field name.
    pub name: String,
    /// Field signature.
    pub signature: FieldSignature,
    /// Compile-time constant, if any.
    pub constant: Option<Constant>,
    /// Marshalling descriptor blob, if any.
    pub marshal: Option<Vec<u8>>,
    /// Explicit layout offset, if any.
    pub layout_offset: Option<u32>,
    /// Initial data mapped through a FieldRVA row, if any.
    pub initial_data: Option<Vec<u8>>,
    /// Custom attributes on the field.
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a field with the given attributes, name, and signature.
    #[must_use]
    pub fn new(
        attributes: FieldAttributes,
        name: impl Into<String>,
        signature: FieldSignature,
    ) -> Self {
        Self {
            rid: 0,
            attributes,
            name: name.into(),
            signature,
            constant: None,
            marshal: None,
            layout_offset: None,
            initial_data: None,
            custom_attributes: Vec::new(),
        }
    }
}

/// A parameter definition.
#[derive(Debug, Clone)]
pub struct ParamDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Parameter attributes.
    pub attributes: ParamAttributes,
    /// Sequence number: 0 for the return value, 1.. for parameters.
    pub sequence: u16,
    /// Parameter name.
    pub name: String,
    /// Default value, if any.
    pub constant: Option<Constant>,
    /// Marshalling descriptor blob, if any.
    pub marshal: Option<Vec<u8>>,
    /// Custom attributes on the parameter.
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParamDef {
    /// Create a parameter row for the given sequence number.
    #[must_use]
    pub fn new(sequence: u16, name: impl Into<String>) -> Self {
        Self {
            rid: 0,
            attributes: ParamAttributes::empty(),
            sequence,
            name: name.into(),
            constant: None,
            marshal: None,
            custom_attributes: Vec::new(),
        }
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Method attributes.
    pub attributes: MethodAttributes,
    /// Implementation attributes.
    pub impl_attributes: MethodImplAttributes,
    /// Method name.
    pub name: String,
    /// Method signature.
    pub signature: MethodSignature,
    /// Parameter rows.
    pub params: Vec<ParamDef>,
    /// The CIL body, if the method has one.
    pub body: Option<MethodBody>,
    /// P/Invoke mapping, if the method is a forwarded import.
    pub pinvoke: Option<PInvokeMap>,
    /// Generic parameters declared by the method.
    pub generic_params: Vec<GenericParam>,
    /// Custom attributes on the method.
    pub custom_attributes: Vec<CustomAttribute>,
    /// Declarative security on the method.
    pub security_declarations: Vec<SecurityDeclaration>,
}

impl MethodDef {
    /// Create a method with the given attributes, name, and signature.
    #[must_use]
    pub fn new(
        attributes: MethodAttributes,
        name: impl Into<String>,
        signature: MethodSignature,
    ) -> Self {
        Self {
            rid: 0,
            attributes,
            impl_attributes: MethodImplAttributes::IL,
            name: name.into(),
            signature,
            params: Vec::new(),
            body: None,
            pinvoke: None,
            generic_params: Vec::new(),
            custom_attributes: Vec::new(),
            security_declarations: Vec::new(),
        }
    }
}

/// The signature carried by a member reference.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRefSignature {
    /// A method reference.
    Method(MethodSignature),
    /// A field reference.
    Field(FieldSignature),
}

/// A reference to a member defined elsewhere.
#[derive(Debug, Clone)]
pub struct MemberRef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// The parent the member is resolved against.
    pub parent: MemberRefParent,
    /// Member name.
    pub name: String,
    /// Member signature.
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// Create a member reference.
    #[must_use]
    pub fn new(
        parent: MemberRefParent,
        name: impl Into<String>,
        signature: MemberRefSignature,
    ) -> Self {
        Self {
            rid: 0,
            parent,
            name: name.into(),
            signature,
        }
    }
}

/// An instantiated generic method.
#[derive(Debug, Clone)]
pub struct MethodSpecDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// The generic method being instantiated.
    pub method: MethodDefOrRef,
    /// The instantiation signature.
    pub instantiation: MethodSpecSignature,
}

/// A signature stored in its own StandAloneSig row.
#[derive(Debug, Clone, PartialEq)]
pub enum StandAloneSignature {
    /// A method signature (for `calli` call sites).
    Method(MethodSignature),
    /// A local variables signature.
    Locals(LocalVariablesSignature),
}

/// A stand-alone signature record.
#[derive(Debug, Clone)]
pub struct StandAloneSig {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// The signature.
    pub signature: StandAloneSignature,
}

//! Signature model and blob serialization (ECMA-335 II.23.2).
//!
//! Signatures reference types through model handles; serialization resolves
//! each handle to a TypeDefOrRef coded token through [`TypeTokenResolver`],
//! which the directory builder implements. Type import and signature
//! emission are therefore mutually recursive; the builder's memoization
//! (tokens are assigned before recursion) keeps cycles finite.

use crate::error::{Error, Result};
use crate::model::TypeDefOrRef;
use crate::writer::Writer;

/// Element type codes (ECMA-335 II.23.1.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    End = 0x00,
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0A,
    U8 = 0x0B,
    R4 = 0x0C,
    R8 = 0x0D,
    String = 0x0E,
    Ptr = 0x0F,
    ByRef = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    Array = 0x14,
    GenericInst = 0x15,
    TypedByRef = 0x16,
    IntPtr = 0x18,
    UIntPtr = 0x19,
    FnPtr = 0x1B,
    Object = 0x1C,
    SzArray = 0x1D,
    MVar = 0x1E,
    CModReqd = 0x1F,
    CModOpt = 0x20,
    Internal = 0x21,
    Modifier = 0x40,
    Sentinel = 0x41,
    Pinned = 0x45,
}

/// Calling convention flags (ECMA-335 II.23.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallingConvention(pub u8);

impl CallingConvention {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST: u8 = 0x0A;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;

    /// Check if the method has an instance pointer (this).
    #[must_use]
    pub fn has_this(self) -> bool {
        (self.0 & Self::HAS_THIS) != 0
    }

    /// Check if this is a generic method.
    #[must_use]
    pub fn is_generic(self) -> bool {
        (self.0 & Self::GENERIC) != 0
    }

    /// Check if this is a vararg method.
    #[must_use]
    pub fn is_vararg(self) -> bool {
        (self.0 & 0x0F) == Self::VARARG
    }
}

/// Resolves model type references to TypeDefOrRef coded token values
/// (the compressed form of ECMA-335 II.23.2.8) during signature emission.
pub trait TypeTokenResolver {
    /// Get the coded token for a type, importing it first if necessary.
    fn type_coded_token(&mut self, ty: TypeDefOrRef) -> Result<u32>;
}

/// A type as it appears inside a signature blob.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSignature {
    /// `void`.
    Void,
    /// `bool`.
    Boolean,
    /// `char`.
    Char,
    /// `sbyte`.
    I1,
    /// `byte`.
    U1,
    /// `short`.
    I2,
    /// `ushort`.
    U2,
    /// `int`.
    I4,
    /// `uint`.
    U4,
    /// `long`.
    I8,
    /// `ulong`.
    U8,
    /// `float`.
    R4,
    /// `double`.
    R8,
    /// `string`.
    String,
    /// `object`.
    Object,
    /// `nint`.
    IntPtr,
    /// `nuint`.
    UIntPtr,
    /// `typedref`.
    TypedByRef,
    /// Class or interface reference.
    Class(TypeDefOrRef),
    /// Value type reference.
    ValueType(TypeDefOrRef),
    /// Single-dimensional zero-based array.
    SzArray(Box<TypeSignature>),
    /// Multi-dimensional array with bounds.
    Array {
        element_type: Box<TypeSignature>,
        rank: u32,
        sizes: Vec<u32>,
        lo_bounds: Vec<i32>,
    },
    /// Pointer to type.
    Ptr(Box<TypeSignature>),
    /// By-reference parameter.
    ByRef(Box<TypeSignature>),
    /// Generic type instantiation.
    GenericInst {
        is_value_type: bool,
        ty: TypeDefOrRef,
        args: Vec<TypeSignature>,
    },
    /// Generic type parameter (`!n`).
    Var(u32),
    /// Generic method parameter (`!!n`).
    MVar(u32),
    /// Function pointer.
    FnPtr(Box<MethodSignature>),
    /// Modified type (modreq/modopt).
    Modifier {
        required: bool,
        modifier: TypeDefOrRef,
        inner: Box<TypeSignature>,
    },
    /// Pinned type (for locals).
    Pinned(Box<TypeSignature>),
}

impl TypeSignature {
    /// Serialize this type into a signature blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        match self {
            Self::Void => writer.write_u8(ElementType::Void as u8),
            Self::Boolean => writer.write_u8(ElementType::Boolean as u8),
            Self::Char => writer.write_u8(ElementType::Char as u8),
            Self::I1 => writer.write_u8(ElementType::I1 as u8),
            Self::U1 => writer.write_u8(ElementType::U1 as u8),
            Self::I2 => writer.write_u8(ElementType::I2 as u8),
            Self::U2 => writer.write_u8(ElementType::U2 as u8),
            Self::I4 => writer.write_u8(ElementType::I4 as u8),
            Self::U4 => writer.write_u8(ElementType::U4 as u8),
            Self::I8 => writer.write_u8(ElementType::I8 as u8),
            Self::U8 => writer.write_u8(ElementType::U8 as u8),
            Self::R4 => writer.write_u8(ElementType::R4 as u8),
            Self::R8 => writer.write_u8(ElementType::R8 as u8),
            Self::String => writer.write_u8(ElementType::String as u8),
            Self::Object => writer.write_u8(ElementType::Object as u8),
            Self::IntPtr => writer.write_u8(ElementType::IntPtr as u8),
            Self::UIntPtr => writer.write_u8(ElementType::UIntPtr as u8),
            Self::TypedByRef => writer.write_u8(ElementType::TypedByRef as u8),
            Self::Class(ty) => {
                writer.write_u8(ElementType::Class as u8);
                let token = resolver.type_coded_token(*ty)?;
                writer.write_compressed_uint(token);
            }
            Self::ValueType(ty) => {
                writer.write_u8(ElementType::ValueType as u8);
                let token = resolver.type_coded_token(*ty)?;
                writer.write_compressed_uint(token);
            }
            Self::SzArray(inner) => {
                writer.write_u8(ElementType::SzArray as u8);
                inner.write(writer, resolver)?;
            }
            Self::Array {
                element_type,
                rank,
                sizes,
                lo_bounds,
            } => {
                if *rank == 0 {
                    return Err(Error::InvalidSignature {
                        context: "array with rank 0".to_string(),
                    });
                }
                writer.write_u8(ElementType::Array as u8);
                element_type.write(writer, resolver)?;
                writer.write_compressed_uint(*rank);
                writer.write_compressed_uint(sizes.len() as u32);
                for size in sizes {
                    writer.write_compressed_uint(*size);
                }
                writer.write_compressed_uint(lo_bounds.len() as u32);
                for bound in lo_bounds {
                    writer.write_compressed_int(*bound);
                }
            }
            Self::Ptr(inner) => {
                writer.write_u8(ElementType::Ptr as u8);
                inner.write(writer, resolver)?;
            }
            Self::ByRef(inner) => {
                writer.write_u8(ElementType::ByRef as u8);
                inner.write(writer, resolver)?;
            }
            Self::GenericInst {
                is_value_type,
                ty,
                args,
            } => {
                if args.is_empty() {
                    return Err(Error::InvalidSignature {
                        context: "generic instantiation with no type arguments".to_string(),
                    });
                }
                writer.write_u8(ElementType::GenericInst as u8);
                writer.write_u8(if *is_value_type {
                    ElementType::ValueType as u8
                } else {
                    ElementType::Class as u8
                });
                let token = resolver.type_coded_token(*ty)?;
                writer.write_compressed_uint(token);
                writer.write_compressed_uint(args.len() as u32);
                for arg in args {
                    arg.write(writer, resolver)?;
                }
            }
            Self::Var(number) => {
                writer.write_u8(ElementType::Var as u8);
                writer.write_compressed_uint(*number);
            }
            Self::MVar(number) => {
                writer.write_u8(ElementType::MVar as u8);
                writer.write_compressed_uint(*number);
            }
            Self::FnPtr(sig) => {
                writer.write_u8(ElementType::FnPtr as u8);
                sig.write(writer, resolver)?;
            }
            Self::Modifier {
                required,
                modifier,
                inner,
            } => {
                writer.write_u8(if *required {
                    ElementType::CModReqd as u8
                } else {
                    ElementType::CModOpt as u8
                });
                let token = resolver.type_coded_token(*modifier)?;
                writer.write_compressed_uint(token);
                inner.write(writer, resolver)?;
            }
            Self::Pinned(inner) => {
                writer.write_u8(ElementType::Pinned as u8);
                inner.write(writer, resolver)?;
            }
        }
        Ok(())
    }
}

/// A method signature (ECMA-335 II.23.2.1).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    /// Calling convention flags.
    pub calling_convention: CallingConvention,
    /// Number of generic parameters (0 if not generic).
    pub generic_param_count: u32,
    /// Return type.
    pub return_type: TypeSignature,
    /// Parameter types.
    pub params: Vec<TypeSignature>,
    /// Extra parameter types after the vararg sentinel.
    pub vararg_params: Vec<TypeSignature>,
}

impl MethodSignature {
    /// A static method signature with the default calling convention.
    #[must_use]
    pub fn new_static(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        Self {
            calling_convention: CallingConvention(CallingConvention::DEFAULT),
            generic_param_count: 0,
            return_type,
            params,
            vararg_params: Vec::new(),
        }
    }

    /// An instance method signature (HASTHIS set).
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        Self {
            calling_convention: CallingConvention(CallingConvention::HAS_THIS),
            generic_param_count: 0,
            return_type,
            params,
            vararg_params: Vec::new(),
        }
    }

    /// Serialize this signature into a blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        writer.write_u8(self.calling_convention.0);
        if self.calling_convention.is_generic() {
            writer.write_compressed_uint(self.generic_param_count);
        }
        writer.write_compressed_uint((self.params.len() + self.vararg_params.len()) as u32);
        self.return_type.write(writer, resolver)?;
        for param in &self.params {
            param.write(writer, resolver)?;
        }
        if !self.vararg_params.is_empty() {
            if !self.calling_convention.is_vararg() {
                return Err(Error::InvalidSignature {
                    context: "sentinel parameters on a non-vararg signature".to_string(),
                });
            }
            writer.write_u8(ElementType::Sentinel as u8);
            for param in &self.vararg_params {
                param.write(writer, resolver)?;
            }
        }
        Ok(())
    }
}

/// A field signature (ECMA-335 II.23.2.4).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSignature {
    /// The field type.
    pub field_type: TypeSignature,
}

impl FieldSignature {
    /// Create a field signature.
    #[must_use]
    pub fn new(field_type: TypeSignature) -> Self {
        Self { field_type }
    }

    /// Serialize this signature into a blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        writer.write_u8(CallingConvention::FIELD);
        self.field_type.write(writer, resolver)
    }
}

/// A property signature (ECMA-335 II.23.2.5).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySignature {
    /// Whether the accessors take an instance pointer.
    pub has_this: bool,
    /// Property type.
    pub property_type: TypeSignature,
    /// Parameter types (for indexed properties).
    pub params: Vec<TypeSignature>,
}

impl PropertySignature {
    /// Serialize this signature into a blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        let mut cc = CallingConvention::PROPERTY;
        if self.has_this {
            cc |= CallingConvention::HAS_THIS;
        }
        writer.write_u8(cc);
        writer.write_compressed_uint(self.params.len() as u32);
        self.property_type.write(writer, resolver)?;
        for param in &self.params {
            param.write(writer, resolver)?;
        }
        Ok(())
    }
}

/// A local variables signature (ECMA-335 II.23.2.6).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalVariablesSignature {
    /// Local variable types.
    pub locals: Vec<TypeSignature>,
}

impl LocalVariablesSignature {
    /// Create a locals signature.
    #[must_use]
    pub fn new(locals: Vec<TypeSignature>) -> Self {
        Self { locals }
    }

    /// Check if there are no locals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Serialize this signature into a blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        writer.write_u8(CallingConvention::LOCAL_SIG);
        writer.write_compressed_uint(self.locals.len() as u32);
        for local in &self.locals {
            local.write(writer, resolver)?;
        }
        Ok(())
    }
}

/// A generic method instantiation signature (ECMA-335 II.23.2.15).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpecSignature {
    /// The type arguments.
    pub args: Vec<TypeSignature>,
}

impl MethodSpecSignature {
    /// Serialize this signature into a blob.
    pub fn write(&self, writer: &mut Writer, resolver: &mut dyn TypeTokenResolver) -> Result<()> {
        if self.args.is_empty() {
            return Err(Error::InvalidSignature {
                context: "method instantiation with no type arguments".to_string(),
            });
        }
        writer.write_u8(CallingConvention::GENERIC_INST);
        writer.write_compressed_uint(self.args.len() as u32);
        for arg in &self.args {
            arg.write(writer, resolver)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleId, TypeRefId};

    /// Maps every type to coded token 0x11 (TypeRef RID 4).
    struct FixedResolver;

    impl TypeTokenResolver for FixedResolver {
        fn type_coded_token(&mut self, _ty: TypeDefOrRef) -> Result<u32> {
            Ok(0x11)
        }
    }

    fn dummy_type() -> TypeDefOrRef {
        TypeDefOrRef::Ref(TypeRefId {
            module: ModuleId::next(),
            index: 0,
        })
    }

    #[test]
    fn test_static_method_signature_bytes() {
        // static void(int32) => DEFAULT, 1 param, void, i4
        let sig = MethodSignature::new_static(TypeSignature::Void, vec![TypeSignature::I4]);
        let mut writer = Writer::new();
        sig.write(&mut writer, &mut FixedResolver).unwrap();
        assert_eq!(writer.as_slice(), &[0x00, 0x01, 0x01, 0x08]);
    }

    #[test]
    fn test_instance_string_method() {
        // instance string() => HASTHIS, 0 params, string
        let sig = MethodSignature::new_instance(TypeSignature::String, vec![]);
        let mut writer = Writer::new();
        sig.write(&mut writer, &mut FixedResolver).unwrap();
        assert_eq!(writer.as_slice(), &[0x20, 0x00, 0x0E]);
    }

    #[test]
    fn test_field_signature_bytes() {
        let sig = FieldSignature::new(TypeSignature::SzArray(Box::new(TypeSignature::U1)));
        let mut writer = Writer::new();
        sig.write(&mut writer, &mut FixedResolver).unwrap();
        assert_eq!(writer.as_slice(), &[0x06, 0x1D, 0x05]);
    }

    #[test]
    fn test_class_reference_uses_resolver() {
        let sig = TypeSignature::Class(dummy_type());
        let mut writer = Writer::new();
        sig.write(&mut writer, &mut FixedResolver).unwrap();
        assert_eq!(writer.as_slice(), &[0x12, 0x11]);
    }

    #[test]
    fn test_locals_signature() {
        let sig = LocalVariablesSignature::new(vec![TypeSignature::I4, TypeSignature::String]);
        let mut writer = Writer::new();
        sig.write(&mut writer, &mut FixedResolver).unwrap();
        assert_eq!(writer.as_slice(), &[0x07, 0x02, 0x08, 0x0E]);
    }

    #[test]
    fn test_generic_inst_requires_args() {
        let sig = TypeSignature::GenericInst {
            is_value_type: false,
            ty: dummy_type(),
            args: vec![],
        };
        let mut writer = Writer::new();
        assert!(sig.write(&mut writer, &mut FixedResolver).is_err());
    }
}

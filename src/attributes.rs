//! Attribute bitmasks from ECMA-335 II.23.1.

use bitflags::bitflags;

bitflags! {
    /// CLI header flags (ECMA-335 II.25.3.3.1). Copied verbatim into the
    /// produced directory's `Flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RuntimeFlags: u32 {
        const IL_ONLY = 0x0001;
        const BIT32_REQUIRED = 0x0002;
        const IL_LIBRARY = 0x0004;
        const STRONG_NAME_SIGNED = 0x0008;
        const NATIVE_ENTRY_POINT = 0x0010;
        const TRACK_DEBUG_DATA = 0x10000;
        const BIT32_PREFERRED = 0x20000;
    }
}

bitflags! {
    /// Flags for types (ECMA-335 II.23.1.15).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeAttributes: u32 {
        // Visibility (3-bit field)
        const NOT_PUBLIC = 0x0000_0000;
        const PUBLIC = 0x0000_0001;
        const NESTED_PUBLIC = 0x0000_0002;
        const NESTED_PRIVATE = 0x0000_0003;
        const NESTED_FAMILY = 0x0000_0004;
        const NESTED_ASSEMBLY = 0x0000_0005;
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        // Layout
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        const EXPLICIT_LAYOUT = 0x0000_0010;
        // Semantics
        const INTERFACE = 0x0000_0020;
        const ABSTRACT = 0x0000_0080;
        const SEALED = 0x0000_0100;
        const SPECIAL_NAME = 0x0000_0400;
        // Implementation
        const IMPORT = 0x0000_1000;
        const SERIALIZABLE = 0x0000_2000;
        // String formatting
        const UNICODE_CLASS = 0x0001_0000;
        const AUTO_CLASS = 0x0002_0000;
        const CUSTOM_FORMAT_CLASS = 0x0003_0000;
        // Additional
        const BEFORE_FIELD_INIT = 0x0010_0000;
        const RT_SPECIAL_NAME = 0x0000_0800;
        const HAS_SECURITY = 0x0004_0000;
        const IS_TYPE_FORWARDER = 0x0020_0000;
    }
}

bitflags! {
    /// Flags for fields (ECMA-335 II.23.1.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldAttributes: u16 {
        // Access (3-bit field)
        const COMPILER_CONTROLLED = 0x0000;
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const SPECIAL_NAME = 0x0200;
        const PINVOKE_IMPL = 0x2000;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_FIELD_MARSHAL = 0x1000;
        const HAS_DEFAULT = 0x8000;
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    /// Flags for methods (ECMA-335 II.23.1.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodAttributes: u16 {
        // Access (3-bit field)
        const COMPILER_CONTROLLED = 0x0000;
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const NEW_SLOT = 0x0100;
        const STRICT = 0x0200;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
        const PINVOKE_IMPL = 0x2000;
        const UNMANAGED_EXPORT = 0x0008;
        const RT_SPECIAL_NAME = 0x1000;
        const HAS_SECURITY = 0x4000;
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

bitflags! {
    /// Implementation flags for methods (ECMA-335 II.23.1.11).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodImplAttributes: u16 {
        const IL = 0x0000;
        const NATIVE = 0x0001;
        const OPTIL = 0x0002;
        const RUNTIME = 0x0003;
        const UNMANAGED = 0x0004;
        const NO_INLINING = 0x0008;
        const FORWARD_REF = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const NO_OPTIMIZATION = 0x0040;
        const PRESERVE_SIG = 0x0080;
        const AGGRESSIVE_INLINING = 0x0100;
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// Flags for params (ECMA-335 II.23.1.13).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamAttributes: u16 {
        const IN = 0x0001;
        const OUT = 0x0002;
        const OPTIONAL = 0x0010;
        const HAS_DEFAULT = 0x1000;
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Flags for properties (ECMA-335 II.23.1.14).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyAttributes: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// Flags for events (ECMA-335 II.23.1.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventAttributes: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// Flags for MethodSemantics (ECMA-335 II.23.1.12).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodSemanticsAttributes: u16 {
        const SETTER = 0x0001;
        const GETTER = 0x0002;
        const OTHER = 0x0004;
        const ADD_ON = 0x0008;
        const REMOVE_ON = 0x0010;
        const FIRE = 0x0020;
    }
}

bitflags! {
    /// Flags for ImplMap (ECMA-335 II.23.1.8).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PInvokeAttributes: u16 {
        const NO_MANGLE = 0x0001;
        const CHAR_SET_ANSI = 0x0002;
        const CHAR_SET_UNICODE = 0x0004;
        const CHAR_SET_AUTO = 0x0006;
        const SUPPORTS_LAST_ERROR = 0x0040;
        const CALL_CONV_PLATFORMAPI = 0x0100;
        const CALL_CONV_CDECL = 0x0200;
        const CALL_CONV_STDCALL = 0x0300;
        const CALL_CONV_THISCALL = 0x0400;
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

bitflags! {
    /// Flags for generic parameters (ECMA-335 II.23.1.7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GenericParamAttributes: u16 {
        const COVARIANT = 0x0001;
        const CONTRAVARIANT = 0x0002;
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    /// Flags for assemblies (ECMA-335 II.23.1.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AssemblyFlags: u32 {
        const PUBLIC_KEY = 0x0001;
        const RETARGETABLE = 0x0100;
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

bitflags! {
    /// Flags for files (ECMA-335 II.23.1.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        const CONTAINS_METADATA = 0x0000;
        const CONTAINS_NO_METADATA = 0x0001;
    }
}

bitflags! {
    /// Flags for manifest resources (ECMA-335 II.23.1.9).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ManifestResourceAttributes: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_attributes_values() {
        assert_eq!(TypeAttributes::PUBLIC.bits(), 0x1);
        assert_eq!(TypeAttributes::INTERFACE.bits(), 0x20);
        assert_eq!(
            (TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::ABSTRACT).bits(),
            0x181
        );
    }

    #[test]
    fn test_method_semantics_values() {
        assert_eq!(MethodSemanticsAttributes::GETTER.bits(), 0x2);
        assert_eq!(MethodSemanticsAttributes::FIRE.bits(), 0x20);
    }
}

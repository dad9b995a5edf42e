//! The module object graph root.

use uuid::Uuid;

use crate::attributes::{AssemblyFlags, FileAttributes, ManifestResourceAttributes, RuntimeFlags};
use crate::model::{
    AssemblyRefId, CustomAttribute, ExportedTypeDef, ExportedTypeId, FieldDef, FieldId, FileId,
    MemberRef, MemberRefId, MethodDef, MethodDefId, MethodSpecDef, MethodSpecId, ModuleId,
    ModuleRefId, SecurityDeclaration, StandAloneSig, StandAloneSigId, TypeDef, TypeDefId, TypeRef,
    TypeRefId, TypeSpec, TypeSpecId,
};

/// Hash algorithm id for SHA-1, the default for assembly manifests.
pub const HASH_ALG_SHA1: u32 = 0x8004;

/// The assembly manifest of a module.
#[derive(Debug, Clone)]
pub struct AssemblyDef {
    /// Assembly name (without extension).
    pub name: String,
    /// Version (major, minor, build, revision).
    pub version: (u16, u16, u16, u16),
    /// Assembly flags.
    pub flags: AssemblyFlags,
    /// Hash algorithm used for file hashes.
    pub hash_alg_id: u32,
    /// Full public key, if the assembly is strong-named.
    pub public_key: Option<Vec<u8>>,
    /// Culture, or `None` for the invariant culture.
    pub culture: Option<String>,
    /// Custom attributes on the assembly.
    pub custom_attributes: Vec<CustomAttribute>,
    /// Declarative security on the assembly.
    pub security_declarations: Vec<SecurityDeclaration>,
}

impl AssemblyDef {
    /// Create an assembly manifest with the given name and version.
    #[must_use]
    pub fn new(name: impl Into<String>, version: (u16, u16, u16, u16)) -> Self {
        Self {
            name: name.into(),
            version,
            flags: AssemblyFlags::empty(),
            hash_alg_id: HASH_ALG_SHA1,
            public_key: None,
            culture: None,
            custom_attributes: Vec::new(),
            security_declarations: Vec::new(),
        }
    }
}

/// A reference to another assembly.
#[derive(Debug, Clone)]
pub struct AssemblyRef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Assembly name.
    pub name: String,
    /// Version (major, minor, build, revision).
    pub version: (u16, u16, u16, u16),
    /// Assembly flags.
    pub flags: AssemblyFlags,
    /// Public key or token, if any.
    pub public_key_or_token: Option<Vec<u8>>,
    /// Culture, or `None` for the invariant culture.
    pub culture: Option<String>,
    /// Hash of the referenced assembly, if any.
    pub hash_value: Option<Vec<u8>>,
}

impl AssemblyRef {
    /// Create an assembly reference with the given name and version.
    #[must_use]
    pub fn new(name: impl Into<String>, version: (u16, u16, u16, u16)) -> Self {
        Self {
            rid: 0,
            name: name.into(),
            version,
            flags: AssemblyFlags::empty(),
            public_key_or_token: None,
            culture: None,
            hash_value: None,
        }
    }
}

/// A reference to another module of the same assembly (or an unmanaged
/// module for P/Invoke).
#[derive(Debug, Clone)]
pub struct ModuleRefDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Module name.
    pub name: String,
}

/// A file record of a multi-file assembly.
#[derive(Debug, Clone)]
pub struct FileDef {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// File attributes.
    pub attributes: FileAttributes,
    /// File name.
    pub name: String,
    /// Hash of the file contents.
    pub hash_value: Vec<u8>,
}

/// Where a manifest resource's payload lives.
#[derive(Debug, Clone)]
pub enum ResourceData {
    /// The payload is embedded in this image's resources blob.
    Embedded(Vec<u8>),
    /// The payload lives in another file of the assembly.
    File {
        /// The file record.
        file: FileId,
        /// Byte offset of the resource within that file.
        offset: u32,
    },
    /// The resource is declared by another assembly.
    Assembly(AssemblyRefId),
}

/// A manifest resource.
#[derive(Debug, Clone)]
pub struct ManifestResource {
    /// Original RID, or 0 to assign fresh.
    pub rid: u32,
    /// Resource attributes.
    pub attributes: ManifestResourceAttributes,
    /// Resource name.
    pub name: String,
    /// The resource payload.
    pub data: ResourceData,
}

/// The managed entry point of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// A method defined in this module.
    Method(MethodDefId),
    /// A file of a multi-file assembly that carries the entry point.
    File(FileId),
}

/// A module: the root of the object graph the builder consumes.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) id: ModuleId,
    /// Module name (usually the file name).
    pub name: String,
    /// Module version identifier.
    pub mvid: Uuid,
    /// Generation (reserved, 0).
    pub generation: u16,
    /// Runtime version string emitted in the metadata root.
    pub runtime_version: String,
    /// CLI header flags, copied verbatim into the produced directory.
    pub runtime_flags: RuntimeFlags,
    /// The assembly manifest, if this module is an assembly.
    pub assembly: Option<AssemblyDef>,
    /// The managed entry point, if any.
    pub entry_point: Option<EntryPoint>,
    /// Custom attributes on the module.
    pub custom_attributes: Vec<CustomAttribute>,

    types: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    type_refs: Vec<TypeRef>,
    type_specs: Vec<TypeSpec>,
    member_refs: Vec<MemberRef>,
    method_specs: Vec<MethodSpecDef>,
    module_refs: Vec<ModuleRefDef>,
    assembly_refs: Vec<AssemblyRef>,
    files: Vec<FileDef>,
    exported_types: Vec<ExportedTypeDef>,
    resources: Vec<ManifestResource>,
    stand_alone_sigs: Vec<StandAloneSig>,
}

macro_rules! arena_accessors {
    ($add:ident, $get:ident, $iter:ident, $field:ident, $ty:ty, $id:ident) => {
        /// Add an object to the module and return its handle.
        pub fn $add(&mut self, value: $ty) -> $id {
            let index = self.$field.len() as u32;
            self.$field.push(value);
            $id {
                module: self.id,
                index,
            }
        }

        /// Get an object by handle. The handle must belong to this module.
        #[must_use]
        pub fn $get(&self, id: $id) -> &$ty {
            debug_assert_eq!(id.module, self.id);
            &self.$field[id.index as usize]
        }

        /// Iterate over the arena in insertion order with handles.
        pub fn $iter(&self) -> impl Iterator<Item = ($id, &$ty)> {
            let module = self.id;
            self.$field.iter().enumerate().map(move |(index, value)| {
                (
                    $id {
                        module,
                        index: index as u32,
                    },
                    value,
                )
            })
        }
    };
}

impl Module {
    /// Create an empty module with a fresh MVID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ModuleId::next(),
            name: name.into(),
            mvid: Uuid::new_v4(),
            generation: 0,
            runtime_version: "v4.0.30319".to_string(),
            runtime_flags: RuntimeFlags::IL_ONLY,
            assembly: None,
            entry_point: None,
            custom_attributes: Vec::new(),
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            type_refs: Vec::new(),
            type_specs: Vec::new(),
            member_refs: Vec::new(),
            method_specs: Vec::new(),
            module_refs: Vec::new(),
            assembly_refs: Vec::new(),
            files: Vec::new(),
            exported_types: Vec::new(),
            resources: Vec::new(),
            stand_alone_sigs: Vec::new(),
        }
    }

    /// Identity of this module, compared by the builder's ownership checks.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    arena_accessors!(define_type, type_def, types, types, TypeDef, TypeDefId);
    arena_accessors!(define_field, field, fields, fields, FieldDef, FieldId);
    arena_accessors!(define_method, method, methods, methods, MethodDef, MethodDefId);
    arena_accessors!(add_type_ref, type_ref, type_refs, type_refs, TypeRef, TypeRefId);
    arena_accessors!(add_type_spec, type_spec, type_specs, type_specs, TypeSpec, TypeSpecId);
    arena_accessors!(
        add_member_ref,
        member_ref,
        member_refs,
        member_refs,
        MemberRef,
        MemberRefId
    );
    arena_accessors!(
        add_method_spec,
        method_spec,
        method_specs,
        method_specs,
        MethodSpecDef,
        MethodSpecId
    );
    arena_accessors!(
        add_module_ref,
        module_ref,
        module_refs,
        module_refs,
        ModuleRefDef,
        ModuleRefId
    );
    arena_accessors!(
        add_assembly_ref,
        assembly_ref,
        assembly_refs,
        assembly_refs,
        AssemblyRef,
        AssemblyRefId
    );
    arena_accessors!(add_file, file, files, files, FileDef, FileId);
    arena_accessors!(
        add_exported_type,
        exported_type,
        exported_types,
        exported_types,
        ExportedTypeDef,
        ExportedTypeId
    );
    arena_accessors!(
        add_stand_alone_sig,
        stand_alone_sig,
        stand_alone_sigs,
        stand_alone_sigs,
        StandAloneSig,
        StandAloneSigId
    );

    /// Add a manifest resource.
    pub fn add_resource(&mut self, resource: ManifestResource) {
        self.resources.push(resource);
    }

    /// The manifest resources in declaration order.
    #[must_use]
    pub fn manifest_resources(&self) -> &[ManifestResource] {
        &self.resources
    }

    /// Get a mutable type definition by handle.
    pub fn type_def_mut(&mut self, id: TypeDefId) -> &mut TypeDef {
        debug_assert_eq!(id.module, self.id);
        &mut self.types[id.index as usize]
    }

    /// Get a mutable method definition by handle.
    pub fn method_mut(&mut self, id: MethodDefId) -> &mut MethodDef {
        debug_assert_eq!(id.module, self.id);
        &mut self.methods[id.index as usize]
    }

    /// Get a mutable field definition by handle.
    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDef {
        debug_assert_eq!(id.module, self.id);
        &mut self.fields[id.index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::TypeAttributes;

    #[test]
    fn test_fresh_modules_have_distinct_ids() {
        let a = Module::new("a.dll");
        let b = Module::new("b.dll");
        assert_ne!(a.id(), b.id());
        assert_ne!(a.mvid, b.mvid);
    }

    #[test]
    fn test_handles_carry_module_identity() {
        let mut module = Module::new("test.dll");
        let td = module.define_type(TypeDef::new(TypeAttributes::PUBLIC, "N", "T"));
        assert_eq!(td.module(), module.id());
        assert_eq!(module.type_def(td).name, "T");
    }

    #[test]
    fn test_iteration_preserves_declaration_order() {
        let mut module = Module::new("test.dll");
        module.define_type(TypeDef::new(TypeAttributes::empty(), "", "<Module>"));
        module.define_type(TypeDef::new(TypeAttributes::PUBLIC, "N", "A"));
        let names: Vec<_> = module.types().map(|(_, t)| t.name.as_str()).collect();
        assert_eq!(names, ["<Module>", "A"]);
    }
}

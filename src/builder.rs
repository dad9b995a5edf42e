//! The metadata directory builder.
//!
//! [`MetadataBuilder`] walks a [`Module`] object graph, importing every
//! reachable member into the table and heap buffers and handing out
//! metadata tokens. Tokens are memoized per member handle: importing the
//! same member twice returns the same token, and definitions receive their
//! tokens before their signatures are serialized, which is what lets the
//! cyclic type → signature → type walk terminate.
//!
//! Construction reserves RIDs for the module, manifest, reference lists,
//! and all type members (so member-list columns stay contiguous);
//! [`MetadataBuilder::create_directory`] fills the reserved rows, imports
//! the manifest leftovers, and serializes the streams. The builder is
//! consumed by `create_directory`; a spent builder cannot be reused.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::attributes::MethodSemanticsAttributes;
use crate::cil::{MethodBodyBuffer, TokenProvider};
use crate::directory::{DotNetDirectory, assemble_metadata};
use crate::error::{Error, Result};
use crate::heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap};
use crate::model::{
    AssemblyRefId, Constant, CustomAttribute, CustomAttributeCtor, EntryPoint, Event,
    ExportedTypeId, ExportedTypeImpl, FieldId, FileId, GenericParam, ItemRef,
    LocalVariablesSignature, MemberRefId, MemberRefParent, MemberRefSignature, MethodDefId,
    MethodDefOrRef, MethodSpecId, Module, ModuleId, ModuleRefId, Property, ResolutionScopeRef,
    ResourceData, SecurityDeclaration, StandAloneSigId, StandAloneSignature, TypeDefId,
    TypeDefOrRef, TypeRefId, TypeSpecId, TypeTokenResolver,
};
use crate::resources::ResourcesBuffer;
use crate::tables::{
    AssemblyRefRow, AssemblyRow, ClassLayoutRow, CodedIndex, CodedIndexKind, ConstantRow,
    CustomAttributeRow, DeclSecurityRow, EventMapRow, EventRow, ExportedTypeRow, FieldLayoutRow,
    FieldMarshalRow, FieldRow, FieldRvaRow, FileRow, GenericParamConstraintRow, GenericParamRow,
    ImplMapRow, InterfaceImplRow, ManifestResourceRow, MemberRefRow, MethodDefRow, MethodImplRow,
    MethodSemanticsRow, MethodSpecRow, ModuleRefRow, ModuleRow, NestedClassRow, ParamRow,
    PropertyMapRow, PropertyRow, StandAloneSigRow, TableId, TablesBuffer, TypeDefRow, TypeRefRow,
    TypeSpecRow,
};
use crate::token::MetadataToken;
use crate::writer::Writer;

/// Member layout of one type definition, fixed at reservation time.
#[derive(Debug, Clone, Copy)]
struct TypeLayout {
    id: TypeDefId,
    rid: u32,
    field_list: u32,
    method_list: u32,
}

/// Builds a .NET metadata directory from a module object graph.
pub struct MetadataBuilder<'m> {
    module: &'m Module,

    strings: StringsHeap,
    user_strings: UserStringsHeap,
    guids: GuidHeap,
    blobs: BlobHeap,
    tables: TablesBuffer,
    bodies: MethodBodyBuffer,
    resources: ResourcesBuffer,
    field_data: Writer,

    type_layouts: Vec<TypeLayout>,

    type_def_tokens: HashMap<TypeDefId, MetadataToken>,
    field_tokens: HashMap<FieldId, MetadataToken>,
    method_tokens: HashMap<MethodDefId, MetadataToken>,
    type_ref_tokens: HashMap<TypeRefId, MetadataToken>,
    type_spec_tokens: HashMap<TypeSpecId, MetadataToken>,
    member_ref_tokens: HashMap<MemberRefId, MetadataToken>,
    method_spec_tokens: HashMap<MethodSpecId, MetadataToken>,
    module_ref_tokens: HashMap<ModuleRefId, MetadataToken>,
    assembly_ref_tokens: HashMap<AssemblyRefId, MetadataToken>,
    file_tokens: HashMap<FileId, MetadataToken>,
    exported_type_tokens: HashMap<ExportedTypeId, MetadataToken>,
    stand_alone_sig_tokens: HashMap<StandAloneSigId, MetadataToken>,
}

impl<'m> MetadataBuilder<'m> {
    /// Create a builder over a module graph.
    ///
    /// Reserves RIDs for the module and assembly rows, the reference
    /// lists, and every type with its fields and methods, so that every
    /// definition already has its final token before anything is
    /// serialized.
    pub fn new(module: &'m Module) -> Result<Self> {
        let mut builder = Self {
            module,
            strings: StringsHeap::new(),
            user_strings: UserStringsHeap::new(),
            guids: GuidHeap::new(),
            blobs: BlobHeap::new(),
            tables: TablesBuffer::new(),
            bodies: MethodBodyBuffer::new(),
            resources: ResourcesBuffer::new(),
            field_data: Writer::new(),
            type_layouts: Vec::new(),
            type_def_tokens: HashMap::new(),
            field_tokens: HashMap::new(),
            method_tokens: HashMap::new(),
            type_ref_tokens: HashMap::new(),
            type_spec_tokens: HashMap::new(),
            member_ref_tokens: HashMap::new(),
            method_spec_tokens: HashMap::new(),
            module_ref_tokens: HashMap::new(),
            assembly_ref_tokens: HashMap::new(),
            file_tokens: HashMap::new(),
            exported_type_tokens: HashMap::new(),
            stand_alone_sig_tokens: HashMap::new(),
        };

        builder.add_module_row()?;
        builder.add_assembly_row()?;

        // The manifest reference lists are imported up front, in
        // declaration order, so their RIDs match the source graph.
        for (id, _) in module.assembly_refs() {
            builder.add_assembly_reference(id)?;
        }
        for (id, _) in module.module_refs() {
            builder.add_module_reference(id)?;
        }

        builder.reserve_type_layouts()?;
        debug!(
            types = builder.type_layouts.len(),
            fields = builder.field_tokens.len(),
            methods = builder.method_tokens.len(),
            "reserved definition tokens"
        );
        Ok(builder)
    }

    /// The #Strings heap under construction.
    #[must_use]
    pub fn strings(&self) -> &StringsHeap {
        &self.strings
    }

    /// The #US heap under construction.
    #[must_use]
    pub fn user_strings(&self) -> &UserStringsHeap {
        &self.user_strings
    }

    /// The #GUID heap under construction.
    #[must_use]
    pub fn guids(&self) -> &GuidHeap {
        &self.guids
    }

    /// The #Blob heap under construction.
    #[must_use]
    pub fn blobs(&self) -> &BlobHeap {
        &self.blobs
    }

    /// The table buffers under construction.
    #[must_use]
    pub fn tables(&self) -> &TablesBuffer {
        &self.tables
    }

    /// Assert a handle belongs to the module under construction.
    ///
    /// Must run before the handle is used to index into the module's
    /// arenas; a foreign handle is only meaningful in its own module.
    fn assert_owned(&self, owner: ModuleId, kind: &'static str, describe: impl std::fmt::Debug) -> Result<()> {
        if owner == self.module.id() {
            Ok(())
        } else {
            Err(Error::MemberNotImported {
                kind,
                name: format!("{describe:?}"),
            })
        }
    }

    // ------------------------------------------------------------------
    // Reservation
    // ------------------------------------------------------------------

    fn add_module_row(&mut self) -> Result<()> {
        let module = self.module;
        let row = ModuleRow {
            generation: module.generation,
            name: self.strings.get_index(&module.name),
            mvid: self.guids.get_index(&module.mvid),
            enc_id: 0,
            enc_base_id: 0,
        };
        self.tables.module.push(row)?;
        Ok(())
    }

    fn add_assembly_row(&mut self) -> Result<()> {
        let module = self.module;
        let Some(assembly) = &module.assembly else {
            return Ok(());
        };
        let row = AssemblyRow {
            hash_alg_id: assembly.hash_alg_id,
            major_version: assembly.version.0,
            minor_version: assembly.version.1,
            build_number: assembly.version.2,
            revision_number: assembly.version.3,
            flags: assembly.flags.bits(),
            public_key: match &assembly.public_key {
                Some(key) => self.blobs.get_index(key),
                None => 0,
            },
            name: self.strings.get_index(&assembly.name),
            culture: match &assembly.culture {
                Some(culture) => self.strings.get_index(culture),
                None => 0,
            },
        };
        self.tables.assembly.push(row)?;
        Ok(())
    }

    /// Reserve TypeDef, Field, and MethodDef RIDs for every type so that
    /// member-list columns can be fixed before any row is filled.
    fn reserve_type_layouts(&mut self) -> Result<()> {
        let module = self.module;

        let mut reserved = Vec::new();
        for (id, type_def) in module.types() {
            let rid = self.tables.type_def.reserve(type_def.rid)?;
            self.type_def_tokens
                .insert(id, MetadataToken::new(TableId::TypeDef, rid));
            reserved.push((rid, id));
        }
        // Member lists follow TypeDef RID order, which preferred RIDs may
        // have decoupled from declaration order.
        reserved.sort_by_key(|&(rid, _)| rid);

        for (rid, id) in reserved {
            let type_def = module.type_def(id);

            let mut field_list = 0;
            for &field_id in &type_def.fields {
                self.assert_owned(field_id.module(), "field definition", field_id)?;
                if self.field_tokens.contains_key(&field_id) {
                    continue;
                }
                let field = module.field(field_id);
                let field_rid = self.tables.field.reserve(field.rid)?;
                self.field_tokens
                    .insert(field_id, MetadataToken::new(TableId::Field, field_rid));
                if field_list == 0 {
                    field_list = field_rid;
                }
            }
            if field_list == 0 {
                field_list = self.tables.field.next_rid();
            }

            let mut method_list = 0;
            for &method_id in &type_def.methods {
                self.assert_owned(method_id.module(), "method definition", method_id)?;
                if self.method_tokens.contains_key(&method_id) {
                    continue;
                }
                let method = module.method(method_id);
                let method_rid = self.tables.method_def.reserve(method.rid)?;
                self.method_tokens
                    .insert(method_id, MetadataToken::new(TableId::MethodDef, method_rid));
                if method_list == 0 {
                    method_list = method_rid;
                }
            }
            if method_list == 0 {
                method_list = self.tables.method_def.next_rid();
            }

            self.type_layouts.push(TypeLayout {
                id,
                rid,
                field_list,
                method_list,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reference importers (public surface)
    // ------------------------------------------------------------------

    /// Import an assembly reference and return its token.
    pub fn add_assembly_reference(&mut self, id: AssemblyRefId) -> Result<MetadataToken> {
        if let Some(&token) = self.assembly_ref_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "assembly reference", id)?;
        let module = self.module;
        let assembly_ref = module.assembly_ref(id);

        let row = AssemblyRefRow {
            major_version: assembly_ref.version.0,
            minor_version: assembly_ref.version.1,
            build_number: assembly_ref.version.2,
            revision_number: assembly_ref.version.3,
            flags: assembly_ref.flags.bits(),
            public_key_or_token: match &assembly_ref.public_key_or_token {
                Some(key) => self.blobs.get_index(key),
                None => 0,
            },
            name: self.strings.get_index(&assembly_ref.name),
            culture: match &assembly_ref.culture {
                Some(culture) => self.strings.get_index(culture),
                None => 0,
            },
            hash_value: match &assembly_ref.hash_value {
                Some(hash) => self.blobs.get_index(hash),
                None => 0,
            },
        };
        let rid = self.tables.assembly_ref.add(row, assembly_ref.rid)?;
        let token = MetadataToken::new(TableId::AssemblyRef, rid);
        self.assembly_ref_tokens.insert(id, token);
        trace!(name = %assembly_ref.name, ?token, "imported assembly reference");
        Ok(token)
    }

    /// Import a module reference and return its token.
    pub fn add_module_reference(&mut self, id: ModuleRefId) -> Result<MetadataToken> {
        if let Some(&token) = self.module_ref_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "module reference", id)?;
        let module = self.module;
        let module_ref = module.module_ref(id);

        let row = ModuleRefRow {
            name: self.strings.get_index(&module_ref.name),
        };
        let rid = self.tables.module_ref.add(row, module_ref.rid)?;
        let token = MetadataToken::new(TableId::ModuleRef, rid);
        self.module_ref_tokens.insert(id, token);
        Ok(token)
    }

    /// Import a type reference and return its token.
    pub fn add_type_reference(&mut self, id: TypeRefId) -> Result<MetadataToken> {
        if let Some(&token) = self.type_ref_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "type reference", id)?;
        let module = self.module;
        let type_ref = module.type_ref(id);

        // Reserve before resolving the scope: a nested reference chain may
        // come back around through this same reference.
        let rid = self.tables.type_ref.reserve(type_ref.rid)?;
        let token = MetadataToken::new(TableId::TypeRef, rid);
        self.type_ref_tokens.insert(id, token);

        let scope = self.resolution_scope_token(type_ref.scope)?;
        let row = TypeRefRow {
            resolution_scope: CodedIndex::from_token(scope),
            type_name: self.strings.get_index(&type_ref.name),
            type_namespace: self.strings.get_index(&type_ref.namespace),
        };
        self.tables.type_ref.fill(rid, row);
        trace!(name = %type_ref.name, ?token, "imported type reference");
        Ok(token)
    }

    /// Import a type specification and return its token.
    pub fn add_type_specification(&mut self, id: TypeSpecId) -> Result<MetadataToken> {
        if let Some(&token) = self.type_spec_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "type specification", id)?;
        let module = self.module;
        let type_spec = module.type_spec(id);

        // Token first: the signature may reference this very spec.
        let rid = self.tables.type_spec.reserve(type_spec.rid)?;
        let token = MetadataToken::new(TableId::TypeSpec, rid);
        self.type_spec_tokens.insert(id, token);

        let mut writer = Writer::new();
        type_spec.signature.write(&mut writer, self)?;
        let row = TypeSpecRow {
            signature: self.blobs.get_index(writer.as_slice()),
        };
        self.tables.type_spec.fill(rid, row);
        Ok(token)
    }

    /// Import a member reference and return its token.
    pub fn add_member_reference(&mut self, id: MemberRefId) -> Result<MetadataToken> {
        if let Some(&token) = self.member_ref_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "member reference", id)?;
        let module = self.module;
        let member_ref = module.member_ref(id);

        let parent = match member_ref.parent {
            MemberRefParent::Type(ty) => self.type_token(ty)?,
            MemberRefParent::ModuleRef(h) => self.add_module_reference(h)?,
            MemberRefParent::MethodDef(h) => self.method_def_token(h)?,
        };

        let mut writer = Writer::new();
        match &member_ref.signature {
            MemberRefSignature::Method(sig) => sig.write(&mut writer, self)?,
            MemberRefSignature::Field(sig) => sig.write(&mut writer, self)?,
        }

        let row = MemberRefRow {
            class: CodedIndex::from_token(parent),
            name: self.strings.get_index(&member_ref.name),
            signature: self.blobs.get_index(writer.as_slice()),
        };
        let rid = self.tables.member_ref.add(row, member_ref.rid)?;
        let token = MetadataToken::new(TableId::MemberRef, rid);
        self.member_ref_tokens.insert(id, token);
        trace!(name = %member_ref.name, ?token, "imported member reference");
        Ok(token)
    }

    /// Import a stand-alone signature and return its token.
    pub fn add_stand_alone_signature(&mut self, id: StandAloneSigId) -> Result<MetadataToken> {
        if let Some(&token) = self.stand_alone_sig_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "stand-alone signature", id)?;
        let module = self.module;
        let sig = module.stand_alone_sig(id);

        let mut writer = Writer::new();
        match &sig.signature {
            StandAloneSignature::Method(method_sig) => method_sig.write(&mut writer, self)?,
            StandAloneSignature::Locals(locals) => locals.write(&mut writer, self)?,
        }
        let row = StandAloneSigRow {
            signature: self.blobs.get_index(writer.as_slice()),
        };
        let rid = self.tables.stand_alone_sig.add(row, sig.rid)?;
        let token = MetadataToken::new(TableId::StandAloneSig, rid);
        self.stand_alone_sig_tokens.insert(id, token);
        Ok(token)
    }

    /// Import a method specification and return its token.
    pub fn add_method_specification(&mut self, id: MethodSpecId) -> Result<MetadataToken> {
        if let Some(&token) = self.method_spec_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "method specification", id)?;
        let module = self.module;
        let method_spec = module.method_spec(id);

        let method = self.method_def_or_ref_token(method_spec.method)?;
        let mut writer = Writer::new();
        method_spec.instantiation.write(&mut writer, self)?;

        let row = MethodSpecRow {
            method: CodedIndex::from_token(method),
            instantiation: self.blobs.get_index(writer.as_slice()),
        };
        let rid = self.tables.method_spec.add(row, method_spec.rid)?;
        let token = MetadataToken::new(TableId::MethodSpec, rid);
        self.method_spec_tokens.insert(id, token);
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn resolution_scope_token(&mut self, scope: ResolutionScopeRef) -> Result<MetadataToken> {
        match scope {
            ResolutionScopeRef::Module => Ok(MetadataToken::new(TableId::Module, 1)),
            ResolutionScopeRef::ModuleRef(h) => self.add_module_reference(h),
            ResolutionScopeRef::AssemblyRef(h) => self.add_assembly_reference(h),
            ResolutionScopeRef::TypeRef(h) => self.add_type_reference(h),
        }
    }

    fn type_token(&mut self, ty: TypeDefOrRef) -> Result<MetadataToken> {
        match ty {
            TypeDefOrRef::Def(h) => self.type_def_token(h),
            TypeDefOrRef::Ref(h) => self.add_type_reference(h),
            TypeDefOrRef::Spec(h) => self.add_type_specification(h),
        }
    }

    fn type_def_token(&self, id: TypeDefId) -> Result<MetadataToken> {
        self.assert_owned(id.module(), "type definition", id)?;
        self.type_def_tokens
            .get(&id)
            .copied()
            .ok_or_else(|| Error::MemberNotImported {
                kind: "type definition",
                name: self.module.type_def(id).name.clone(),
            })
    }

    fn method_def_token(&self, id: MethodDefId) -> Result<MetadataToken> {
        self.assert_owned(id.module(), "method definition", id)?;
        // Every method attached to a type was reserved at construction; a
        // miss means the method is not in any type's member list.
        self.method_tokens
            .get(&id)
            .copied()
            .ok_or_else(|| Error::MemberNotImported {
                kind: "method definition",
                name: self.module.method(id).name.clone(),
            })
    }

    fn field_token(&self, id: FieldId) -> Result<MetadataToken> {
        self.assert_owned(id.module(), "field definition", id)?;
        self.field_tokens
            .get(&id)
            .copied()
            .ok_or_else(|| Error::MemberNotImported {
                kind: "field definition",
                name: self.module.field(id).name.clone(),
            })
    }

    fn method_def_or_ref_token(&mut self, method: MethodDefOrRef) -> Result<MetadataToken> {
        match method {
            MethodDefOrRef::Def(h) => self.method_def_token(h),
            MethodDefOrRef::Ref(h) => self.add_member_reference(h),
        }
    }

    fn file_token(&mut self, id: FileId) -> Result<MetadataToken> {
        if let Some(&token) = self.file_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "file", id)?;
        let module = self.module;
        let file = module.file(id);

        let row = FileRow {
            flags: file.attributes.bits(),
            name: self.strings.get_index(&file.name),
            hash_value: self.blobs.get_index(&file.hash_value),
        };
        let rid = self.tables.file.add(row, file.rid)?;
        let token = MetadataToken::new(TableId::File, rid);
        self.file_tokens.insert(id, token);
        Ok(token)
    }

    fn exported_type_token(&mut self, id: ExportedTypeId) -> Result<MetadataToken> {
        if let Some(&token) = self.exported_type_tokens.get(&id) {
            return Ok(token);
        }
        self.assert_owned(id.module(), "exported type", id)?;
        let module = self.module;
        let exported = module.exported_type(id);

        // Token first: nested exported types chain through Implementation.
        let rid = self.tables.exported_type.reserve(exported.rid)?;
        let token = MetadataToken::new(TableId::ExportedType, rid);
        self.exported_type_tokens.insert(id, token);

        let implementation = match exported.implementation {
            ExportedTypeImpl::File(h) => self.file_token(h)?,
            ExportedTypeImpl::AssemblyRef(h) => self.add_assembly_reference(h)?,
            ExportedTypeImpl::ExportedType(h) => self.exported_type_token(h)?,
        };
        let row = ExportedTypeRow {
            flags: exported.attributes.bits(),
            type_def_id: exported.type_def_id,
            type_name: self.strings.get_index(&exported.name),
            type_namespace: self.strings.get_index(&exported.namespace),
            implementation: CodedIndex::from_token(implementation),
        };
        self.tables.exported_type.fill(rid, row);

        self.add_custom_attributes(token, &exported.custom_attributes)?;
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Definition fill
    // ------------------------------------------------------------------

    fn fill_type_definitions(&mut self) -> Result<()> {
        for layout in std::mem::take(&mut self.type_layouts) {
            self.fill_type_definition(layout)?;
        }
        Ok(())
    }

    fn fill_type_definition(&mut self, layout: TypeLayout) -> Result<()> {
        let module = self.module;
        let type_def = module.type_def(layout.id);
        let token = MetadataToken::new(TableId::TypeDef, layout.rid);

        let extends = match type_def.extends {
            Some(ty) => CodedIndex::from_token(self.type_token(ty)?),
            None => CodedIndex::null(),
        };
        let row = TypeDefRow {
            flags: type_def.attributes.bits(),
            type_name: self.strings.get_index(&type_def.name),
            type_namespace: self.strings.get_index(&type_def.namespace),
            extends,
            field_list: layout.field_list,
            method_list: layout.method_list,
        };
        self.tables.type_def.fill(layout.rid, row);

        for &field_id in &type_def.fields {
            self.fill_field(field_id)?;
        }
        for &method_id in &type_def.methods {
            self.fill_method(method_id)?;
        }

        for &interface in &type_def.interfaces {
            let interface_token = self.type_token(interface)?;
            self.tables.interface_impl.push(InterfaceImplRow {
                class: layout.rid,
                interface: CodedIndex::from_token(interface_token),
            })?;
        }

        if let Some(class_layout) = type_def.class_layout {
            self.tables.class_layout.push(ClassLayoutRow {
                packing_size: class_layout.packing_size,
                class_size: class_layout.class_size,
                parent: layout.rid,
            })?;
        }

        if let Some(enclosing) = type_def.enclosing_type {
            let enclosing_token = self.type_def_token(enclosing)?;
            self.tables.nested_class.push(NestedClassRow {
                nested_class: layout.rid,
                enclosing_class: enclosing_token.rid(),
            })?;
        }

        for method_impl in &type_def.method_impls {
            let body = self.method_def_or_ref_token(method_impl.body)?;
            let declaration = self.method_def_or_ref_token(method_impl.declaration)?;
            self.tables.method_impl.push(MethodImplRow {
                class: layout.rid,
                method_body: CodedIndex::from_token(body),
                method_declaration: CodedIndex::from_token(declaration),
            })?;
        }

        self.add_generic_params(token, &type_def.generic_params)?;
        self.fill_properties(layout.rid, &type_def.properties)?;
        self.fill_events(layout.rid, &type_def.events)?;
        self.add_custom_attributes(token, &type_def.custom_attributes)?;
        self.add_security_declarations(token, &type_def.security_declarations)?;
        Ok(())
    }

    fn fill_field(&mut self, id: FieldId) -> Result<()> {
        let module = self.module;
        let field = module.field(id);
        let token = self.field_token(id)?;
        let rid = token.rid();

        let mut writer = Writer::new();
        field.signature.write(&mut writer, self)?;
        let row = FieldRow {
            flags: field.attributes.bits(),
            name: self.strings.get_index(&field.name),
            signature: self.blobs.get_index(writer.as_slice()),
        };
        self.tables.field.fill(rid, row);

        if let Some(constant) = &field.constant {
            self.add_constant(token, constant)?;
        }
        if let Some(marshal) = &field.marshal {
            self.add_field_marshal(token, marshal)?;
        }
        if let Some(offset) = field.layout_offset {
            self.tables.field_layout.push(FieldLayoutRow { offset, field: rid })?;
        }
        if let Some(data) = &field.initial_data {
            self.field_data.align(8);
            let offset = self.field_data.len() as u32;
            self.field_data.write_bytes(data);
            self.tables.field_rva.push(FieldRvaRow { rva: offset, field: rid })?;
        }
        self.add_custom_attributes(token, &field.custom_attributes)?;
        Ok(())
    }

    fn fill_method(&mut self, id: MethodDefId) -> Result<()> {
        let module = self.module;
        let method = module.method(id);
        let token = self.method_def_token(id)?;
        let rid = token.rid();

        let mut writer = Writer::new();
        method.signature.write(&mut writer, self)?;
        let signature = self.blobs.get_index(writer.as_slice());

        let param_list = self.tables.param.next_rid();
        for param in &method.params {
            let param_rid = self.tables.param.add(
                ParamRow {
                    flags: param.attributes.bits(),
                    sequence: param.sequence,
                    name: self.strings.get_index(&param.name),
                },
                param.rid,
            )?;
            let param_token = MetadataToken::new(TableId::Param, param_rid);
            if let Some(constant) = &param.constant {
                self.add_constant(param_token, constant)?;
            }
            if let Some(marshal) = &param.marshal {
                self.add_field_marshal(param_token, marshal)?;
            }
            self.add_custom_attributes(param_token, &param.custom_attributes)?;
        }

        let rva = match &method.body {
            Some(body) => {
                // The buffer is detached while serializing because the
                // builder itself is the token provider.
                let mut bodies = std::mem::take(&mut self.bodies);
                let result = bodies.serialize(&method.name, body, self);
                self.bodies = bodies;
                result?
            }
            None => 0,
        };

        let row = MethodDefRow {
            rva,
            impl_flags: method.impl_attributes.bits(),
            flags: method.attributes.bits(),
            name: self.strings.get_index(&method.name),
            signature,
            param_list,
        };
        self.tables.method_def.fill(rid, row);

        if let Some(pinvoke) = &method.pinvoke {
            let scope = self.add_module_reference(pinvoke.import_scope)?;
            self.tables.impl_map.push(ImplMapRow {
                mapping_flags: pinvoke.attributes.bits(),
                member_forwarded: CodedIndex::from_token(token),
                import_name: self.strings.get_index(&pinvoke.import_name),
                import_scope: scope.rid(),
            })?;
        }

        self.add_generic_params(token, &method.generic_params)?;
        self.add_custom_attributes(token, &method.custom_attributes)?;
        self.add_security_declarations(token, &method.security_declarations)?;
        Ok(())
    }

    fn fill_properties(&mut self, type_rid: u32, properties: &[Property]) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }
        self.tables.property_map.push(PropertyMapRow {
            parent: type_rid,
            property_list: self.tables.property.next_rid(),
        })?;

        for property in properties {
            let mut writer = Writer::new();
            property.signature.write(&mut writer, self)?;
            let rid = self.tables.property.push(PropertyRow {
                flags: property.attributes.bits(),
                name: self.strings.get_index(&property.name),
                property_type: self.blobs.get_index(writer.as_slice()),
            })?;
            let token = MetadataToken::new(TableId::Property, rid);

            if let Some(constant) = &property.constant {
                self.add_constant(token, constant)?;
            }
            self.add_semantics(token, property.getter, MethodSemanticsAttributes::GETTER)?;
            self.add_semantics(token, property.setter, MethodSemanticsAttributes::SETTER)?;
            for &other in &property.other_methods {
                self.add_semantics(token, Some(other), MethodSemanticsAttributes::OTHER)?;
            }
            self.add_custom_attributes(token, &property.custom_attributes)?;
        }
        Ok(())
    }

    fn fill_events(&mut self, type_rid: u32, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.tables.event_map.push(EventMapRow {
            parent: type_rid,
            event_list: self.tables.event.next_rid(),
        })?;

        for event in events {
            let event_type = self.type_token(event.event_type)?;
            let rid = self.tables.event.push(EventRow {
                event_flags: event.attributes.bits(),
                name: self.strings.get_index(&event.name),
                event_type: CodedIndex::from_token(event_type),
            })?;
            let token = MetadataToken::new(TableId::Event, rid);

            self.add_semantics(token, event.add_method, MethodSemanticsAttributes::ADD_ON)?;
            self.add_semantics(token, event.remove_method, MethodSemanticsAttributes::REMOVE_ON)?;
            self.add_semantics(token, event.raise_method, MethodSemanticsAttributes::FIRE)?;
            for &other in &event.other_methods {
                self.add_semantics(token, Some(other), MethodSemanticsAttributes::OTHER)?;
            }
            self.add_custom_attributes(token, &event.custom_attributes)?;
        }
        Ok(())
    }

    fn add_semantics(
        &mut self,
        association: MetadataToken,
        method: Option<MethodDefId>,
        semantics: MethodSemanticsAttributes,
    ) -> Result<()> {
        let Some(method) = method else {
            return Ok(());
        };
        let method_token = self.method_def_token(method)?;
        self.tables.method_semantics.push(MethodSemanticsRow {
            semantics: semantics.bits(),
            method: method_token.rid(),
            association: CodedIndex::from_token(association),
        })?;
        Ok(())
    }

    fn add_generic_params(
        &mut self,
        owner: MetadataToken,
        params: &[GenericParam],
    ) -> Result<()> {
        for param in params {
            let rid = self.tables.generic_param.push(GenericParamRow {
                number: param.number,
                flags: param.attributes.bits(),
                owner: CodedIndex::from_token(owner),
                name: self.strings.get_index(&param.name),
            })?;
            let token = MetadataToken::new(TableId::GenericParam, rid);

            for &constraint in &param.constraints {
                let constraint_token = self.type_token(constraint)?;
                self.tables
                    .generic_param_constraint
                    .push(GenericParamConstraintRow {
                        owner: rid,
                        constraint: CodedIndex::from_token(constraint_token),
                    })?;
            }
            self.add_custom_attributes(token, &param.custom_attributes)?;
        }
        Ok(())
    }

    fn add_constant(&mut self, parent: MetadataToken, constant: &Constant) -> Result<()> {
        self.tables.constant.push(ConstantRow {
            constant_type: constant.element_type as u8,
            padding: 0,
            parent: CodedIndex::from_token(parent),
            value: self.blobs.get_index(&constant.value),
        })?;
        Ok(())
    }

    fn add_field_marshal(&mut self, parent: MetadataToken, descriptor: &[u8]) -> Result<()> {
        self.tables.field_marshal.push(FieldMarshalRow {
            parent: CodedIndex::from_token(parent),
            native_type: self.blobs.get_index(descriptor),
        })?;
        Ok(())
    }

    fn add_custom_attributes(
        &mut self,
        parent: MetadataToken,
        attributes: &[CustomAttribute],
    ) -> Result<()> {
        for attribute in attributes {
            let ctor = match attribute.ctor {
                CustomAttributeCtor::MethodDef(h) => self.method_def_token(h)?,
                CustomAttributeCtor::MemberRef(h) => self.add_member_reference(h)?,
            };
            self.tables.custom_attribute.push(CustomAttributeRow {
                parent: CodedIndex::from_token(parent),
                attr_type: CodedIndex::from_token(ctor),
                value: self.blobs.get_index(&attribute.value),
            })?;
        }
        Ok(())
    }

    fn add_security_declarations(
        &mut self,
        parent: MetadataToken,
        declarations: &[SecurityDeclaration],
    ) -> Result<()> {
        for declaration in declarations {
            self.tables.decl_security.push(DeclSecurityRow {
                action: declaration.action,
                parent: CodedIndex::from_token(parent),
                permission_set: self.blobs.get_index(&declaration.permission_set),
            })?;
        }
        Ok(())
    }

    fn add_manifest_resources(&mut self) -> Result<()> {
        let module = self.module;
        for resource in module.manifest_resources() {
            let (offset, implementation) = match &resource.data {
                ResourceData::Embedded(payload) => (self.resources.add(payload), CodedIndex::null()),
                ResourceData::File { file, offset } => {
                    let file_token = self.file_token(*file)?;
                    (*offset, CodedIndex::from_token(file_token))
                }
                ResourceData::Assembly(assembly_ref) => {
                    let token = self.add_assembly_reference(*assembly_ref)?;
                    (0, CodedIndex::from_token(token))
                }
            };
            self.tables.manifest_resource.add(
                ManifestResourceRow {
                    offset,
                    flags: resource.attributes.bits(),
                    name: self.strings.get_index(&resource.name),
                    implementation,
                },
                resource.rid,
            )?;
        }
        Ok(())
    }

    fn resolve_entry_point(&mut self) -> Result<u32> {
        let module = self.module;
        match module.entry_point {
            None => Ok(0),
            Some(EntryPoint::Method(h)) => Ok(self.method_def_token(h)?.as_u32()),
            Some(EntryPoint::File(h)) => Ok(self.file_token(h)?.as_u32()),
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    fn check_heap_sizes(&self) -> Result<()> {
        let heaps: [(&'static str, usize); 4] = [
            ("#Strings heap", self.strings.size()),
            ("#US heap", self.user_strings.size()),
            ("#GUID heap", self.guids.size()),
            ("#Blob heap", self.blobs.size()),
        ];
        for (name, size) in heaps {
            if size > u32::MAX as usize {
                return Err(Error::IndexOverflow {
                    what: name,
                    size: size as u64,
                });
            }
        }
        Ok(())
    }

    fn heap_sizes(&self) -> u8 {
        let mut heap_sizes = 0u8;
        if self.strings.uses_wide_indices() {
            heap_sizes |= 0x01;
        }
        if self.guids.uses_wide_indices() {
            heap_sizes |= 0x02;
        }
        if self.blobs.uses_wide_indices() {
            heap_sizes |= 0x04;
        }
        heap_sizes
    }

    /// Import everything reachable from the module and serialize the
    /// directory. Consumes the builder.
    pub fn create_directory(mut self) -> Result<DotNetDirectory> {
        let module = self.module;

        self.fill_type_definitions()?;

        for (id, _) in module.files() {
            self.file_token(id)?;
        }
        for (id, _) in module.exported_types() {
            self.exported_type_token(id)?;
        }
        self.add_manifest_resources()?;

        self.add_custom_attributes(
            MetadataToken::new(TableId::Module, 1),
            &module.custom_attributes,
        )?;
        if let Some(assembly) = &module.assembly {
            let token = MetadataToken::new(TableId::Assembly, 1);
            self.add_custom_attributes(token, &assembly.custom_attributes)?;
            self.add_security_declarations(token, &assembly.security_declarations)?;
        }

        let entry_point = self.resolve_entry_point()?;

        self.check_heap_sizes()?;
        let heap_sizes = self.heap_sizes();
        let tables = self.tables.serialize(heap_sizes)?;

        let mut strings = Writer::new();
        self.strings.flush(&mut strings);
        let mut user_strings = Writer::new();
        self.user_strings.flush(&mut user_strings);
        let mut guids = Writer::new();
        self.guids.flush(&mut guids);
        let mut blobs = Writer::new();
        self.blobs.flush(&mut blobs);

        let metadata = assemble_metadata(
            &module.runtime_version,
            tables,
            strings.into_inner(),
            user_strings.into_inner(),
            guids.into_inner(),
            blobs.into_inner(),
        );
        debug!(
            metadata_size = metadata.len(),
            bodies = self.bodies.size(),
            entry_point = format_args!("{entry_point:#010X}"),
            "directory serialized"
        );

        Ok(DotNetDirectory {
            metadata,
            method_bodies: self.bodies.into_inner(),
            field_data: self.field_data.into_inner(),
            resources: self.resources.into_inner(),
            entry_point,
            flags: module.runtime_flags.bits(),
        })
    }
}

impl TypeTokenResolver for MetadataBuilder<'_> {
    fn type_coded_token(&mut self, ty: TypeDefOrRef) -> Result<u32> {
        let token = self.type_token(ty)?;
        Ok(CodedIndex::from_token(token).encode(CodedIndexKind::TypeDefOrRef))
    }
}

impl TokenProvider for MetadataBuilder<'_> {
    fn item_token(&mut self, item: ItemRef) -> Result<MetadataToken> {
        match item {
            ItemRef::Type(ty) => self.type_token(ty),
            ItemRef::MethodDef(h) => self.method_def_token(h),
            ItemRef::FieldDef(h) => self.field_token(h),
            ItemRef::MemberRef(h) => self.add_member_reference(h),
            ItemRef::MethodSpec(h) => self.add_method_specification(h),
            ItemRef::Signature(h) => self.add_stand_alone_signature(h),
        }
    }

    fn string_token(&mut self, value: &str) -> Result<MetadataToken> {
        let offset = self.user_strings.get_index(value);
        if offset > 0x00FF_FFFF {
            return Err(Error::IndexOverflow {
                what: "#US heap",
                size: u64::from(offset),
            });
        }
        Ok(MetadataToken::user_string(offset))
    }

    fn locals_token(&mut self, locals: &LocalVariablesSignature) -> Result<MetadataToken> {
        let mut writer = Writer::new();
        locals.write(&mut writer, self)?;
        let row = StandAloneSigRow {
            signature: self.blobs.get_index(writer.as_slice()),
        };
        let rid = self.tables.stand_alone_sig.push(row)?;
        Ok(MetadataToken::new(TableId::StandAloneSig, rid))
    }

    fn catch_type_token(&mut self, ty: TypeDefOrRef) -> Result<MetadataToken> {
        self.type_token(ty)
    }
}

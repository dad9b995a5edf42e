//! End-to-end builder scenarios: build a module graph, emit the directory,
//! and parse the emitted streams back.

use clremit::attributes::{MethodAttributes, TypeAttributes};
use clremit::builder::MetadataBuilder;
use clremit::cil::{Instruction, MethodBody, OpCode, Operand};
use clremit::directory::DotNetDirectory;
use clremit::model::{
    AssemblyDef, AssemblyRef, CustomAttribute, CustomAttributeCtor, EntryPoint, FieldDef,
    FieldSignature, GenericParam, ItemRef, LocalVariablesSignature, MemberRef, MemberRefParent,
    MemberRefSignature, MethodDef, MethodSignature, Module, ResolutionScopeRef, StandAloneSig,
    StandAloneSignature, TypeDef, TypeDefOrRef, TypeRef, TypeSignature,
};
use clremit::reader::Reader;
use clremit::root::MetadataRoot;
use clremit::tables::{
    ALL_TABLES, AssemblyRow, CustomAttributeRow, GenericParamConstraintRow, GenericParamRow,
    MemberRefRow, ModuleRow, StandAloneSigRow, TableContext, TableId, TablesHeader, TypeDefRow,
};

/// The parsed tables stream of an emitted directory.
struct Tables {
    header: TablesHeader,
    data: Vec<u8>,
}

impl Tables {
    fn parse(directory: &DotNetDirectory) -> (MetadataRoot, Tables) {
        let root = MetadataRoot::parse(&directory.metadata).unwrap();
        let stream = root.tables_stream().unwrap();
        let data =
            directory.metadata[stream.offset as usize..(stream.offset + stream.size) as usize]
                .to_vec();
        let header = TablesHeader::parse(&mut Reader::new(&data)).unwrap();
        (root, Tables { header, data })
    }

    fn ctx(&self) -> TableContext {
        self.header.context()
    }

    /// Position a reader at the first row of the given table.
    fn rows(&self, table: TableId) -> Reader<'_> {
        let ctx = self.ctx();
        let mut offset = self.header.size();
        for preceding in ALL_TABLES {
            if preceding == table {
                break;
            }
            offset += self.header.row_count(preceding) as usize * ctx.row_size(preceding);
        }
        let mut reader = Reader::new(&self.data);
        reader.seek(offset).unwrap();
        reader
    }
}

/// Extract a heap stream's bytes from the emitted metadata.
fn stream_bytes<'a>(directory: &'a DotNetDirectory, root: &MetadataRoot, name: &str) -> &'a [u8] {
    let stream = root.find_stream(name).unwrap();
    &directory.metadata[stream.offset as usize..(stream.offset + stream.size) as usize]
}

/// Read a null-terminated string out of raw #Strings bytes.
fn heap_string(strings: &[u8], offset: u32) -> &str {
    let bytes = &strings[offset as usize..];
    let end = bytes.iter().position(|&b| b == 0).unwrap();
    std::str::from_utf8(&bytes[..end]).unwrap()
}

#[test]
fn empty_module_emits_module_and_assembly_rows_only() {
    let mut module = Module::new("Empty");
    module.assembly = Some(AssemblyDef::new("Empty", (1, 0, 0, 0)));

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let (root, tables) = Tables::parse(&directory);

    // Only Module and Assembly carry rows.
    let expected = (1u64 << TableId::Module as u8) | (1u64 << TableId::Assembly as u8);
    assert_eq!(tables.header.valid, expected);
    assert_eq!(tables.header.row_count(TableId::Module), 1);
    assert_eq!(tables.header.row_count(TableId::Assembly), 1);

    let ctx = tables.ctx();
    let module_row = ModuleRow::parse(&mut tables.rows(TableId::Module), &ctx).unwrap();
    let assembly_row = AssemblyRow::parse(&mut tables.rows(TableId::Assembly), &ctx).unwrap();

    let strings = stream_bytes(&directory, &root, "#Strings");
    assert_eq!(heap_string(strings, 0), "");
    assert_eq!(heap_string(strings, module_row.name), "Empty");
    assert_eq!(assembly_row.name, module_row.name);

    // One fresh MVID in #GUID.
    let guids = stream_bytes(&directory, &root, "#GUID");
    assert_eq!(guids.len(), 16);
    assert_eq!(guids, &module.mvid.to_bytes_le()[..]);
    assert_eq!(module_row.mvid, 1);

    assert_eq!(directory.entry_point, 0);
    assert!(directory.resources.is_none());
}

#[test]
fn hello_world_tokens_and_body() {
    let mut module = Module::new("HelloWorld.exe");
    module.assembly = Some(AssemblyDef::new("HelloWorld", (1, 0, 0, 0)));

    let corlib = module.add_assembly_ref(AssemblyRef::new("System.Runtime", (8, 0, 0, 0)));
    let object_ref = module.add_type_ref(TypeRef::new(
        ResolutionScopeRef::AssemblyRef(corlib),
        "System",
        "Object",
    ));
    let console_ref = module.add_type_ref(TypeRef::new(
        ResolutionScopeRef::AssemblyRef(corlib),
        "System",
        "Console",
    ));
    let write_line = module.add_member_ref(MemberRef::new(
        MemberRefParent::Type(TypeDefOrRef::Ref(console_ref)),
        "WriteLine",
        MemberRefSignature::Method(MethodSignature::new_static(
            TypeSignature::Void,
            vec![TypeSignature::String],
        )),
    ));

    module.define_type(TypeDef::new(TypeAttributes::empty(), "", "<Module>"));
    let mut program = TypeDef::new(
        TypeAttributes::PUBLIC | TypeAttributes::BEFORE_FIELD_INIT,
        "HelloWorld",
        "Program",
    );
    program.extends = Some(TypeDefOrRef::Ref(object_ref));
    let program_id = module.define_type(program);

    let mut main = MethodDef::new(
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        "Main",
        MethodSignature::new_static(TypeSignature::Void, vec![]),
    );
    main.body = Some(MethodBody::new(
        8,
        vec![
            Instruction::with_operand(OpCode::ldstr, Operand::String("Hello".into())),
            Instruction::with_operand(OpCode::call, Operand::Item(ItemRef::MemberRef(write_line))),
            Instruction::new(OpCode::ret),
        ],
    ));
    let main_id = module.define_method(main);
    module.type_def_mut(program_id).methods.push(main_id);
    module.entry_point = Some(EntryPoint::Method(main_id));

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let (root, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();

    // `<Module>` is TypeDef RID 1, Program RID 2.
    assert_eq!(tables.header.row_count(TableId::TypeDef), 2);
    let mut reader = tables.rows(TableId::TypeDef);
    let module_type = TypeDefRow::parse(&mut reader, &ctx).unwrap();
    let program_row = TypeDefRow::parse(&mut reader, &ctx).unwrap();

    let strings = stream_bytes(&directory, &root, "#Strings");
    assert_eq!(heap_string(strings, module_type.type_name), "<Module>");
    assert_eq!(heap_string(strings, program_row.type_name), "Program");
    assert_eq!(heap_string(strings, program_row.type_namespace), "HelloWorld");
    assert_eq!(program_row.method_list, 1);

    // Main is MethodDef RID 1; the entry point token follows.
    assert_eq!(tables.header.row_count(TableId::MethodDef), 1);
    assert_eq!(directory.entry_point, 0x0600_0001);

    // The WriteLine reference hangs off the Console TypeRef.
    let member_ref = MemberRefRow::parse(&mut tables.rows(TableId::MemberRef), &ctx).unwrap();
    assert_eq!(member_ref.class.table, Some(TableId::TypeRef));
    assert_eq!(heap_string(strings, member_ref.name), "WriteLine");

    // Tiny body: ldstr 0x70000001, call 0x0A000001, ret.
    let body = &directory.method_bodies;
    assert_eq!(body[0], (11 << 2) | 0x02);
    assert_eq!(body[1], 0x72);
    assert_eq!(&body[2..6], &0x7000_0001u32.to_le_bytes());
    assert_eq!(body[6], 0x28);
    assert_eq!(&body[7..11], &0x0A00_0001u32.to_le_bytes());
    assert_eq!(body[11], 0x2A);
}

#[test]
fn generic_constraint_rows_are_emitted_sorted() {
    let mut module = Module::new("Box.dll");
    module.assembly = Some(AssemblyDef::new("Box", (1, 0, 0, 0)));

    let corlib = module.add_assembly_ref(AssemblyRef::new("System.Runtime", (8, 0, 0, 0)));
    let comparable_ref = module.add_type_ref(TypeRef::new(
        ResolutionScopeRef::AssemblyRef(corlib),
        "System",
        "IComparable",
    ));

    module.define_type(TypeDef::new(TypeAttributes::empty(), "", "<Module>"));
    let mut boxed = TypeDef::new(TypeAttributes::PUBLIC, "", "Box`1");
    let mut param = GenericParam::new(0, "T");
    param.constraints.push(TypeDefOrRef::Ref(comparable_ref));
    boxed.generic_params.push(param);
    module.define_type(boxed);

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let (root, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();

    assert_eq!(tables.header.row_count(TableId::GenericParam), 1);
    let generic_param =
        GenericParamRow::parse(&mut tables.rows(TableId::GenericParam), &ctx).unwrap();
    assert_eq!(generic_param.number, 0);
    assert_eq!(generic_param.owner.table, Some(TableId::TypeDef));
    assert_eq!(generic_param.owner.row, 2);

    let strings = stream_bytes(&directory, &root, "#Strings");
    assert_eq!(heap_string(strings, generic_param.name), "T");

    let constraint =
        GenericParamConstraintRow::parse(&mut tables.rows(TableId::GenericParamConstraint), &ctx)
            .unwrap();
    assert_eq!(constraint.owner, 1);
    assert_eq!(constraint.constraint.table, Some(TableId::TypeRef));

    // The sorted bit covers GenericParam.
    assert_ne!(tables.header.sorted & (1 << TableId::GenericParam as u8), 0);
}

#[test]
fn custom_attribute_rows_sort_by_parent_coded_value() {
    let mut module = Module::new("Attr.dll");
    let mut assembly = AssemblyDef::new("Attr", (1, 0, 0, 0));

    let corlib = module.add_assembly_ref(AssemblyRef::new("System.Runtime", (8, 0, 0, 0)));
    let attr_type = module.add_type_ref(TypeRef::new(
        ResolutionScopeRef::AssemblyRef(corlib),
        "System.Reflection",
        "AssemblyVersionAttribute",
    ));
    let attr_ctor = module.add_member_ref(MemberRef::new(
        MemberRefParent::Type(TypeDefOrRef::Ref(attr_type)),
        ".ctor",
        MemberRefSignature::Method(MethodSignature::new_instance(
            TypeSignature::Void,
            vec![TypeSignature::String],
        )),
    ));

    // Prolog, packed string "1.0.0.0", zero named arguments.
    let mut value = vec![0x01, 0x00, 0x07];
    value.extend_from_slice(b"1.0.0.0");
    value.extend_from_slice(&[0x00, 0x00]);
    let attribute = CustomAttribute {
        ctor: CustomAttributeCtor::MemberRef(attr_ctor),
        value,
    };
    assembly.custom_attributes.push(attribute.clone());
    module.assembly = Some(assembly);

    // A second attribute on a type, imported *before* the assembly's: the
    // type parent's coded value (TypeDef RID 2, tag 3 => 67) is larger
    // than the assembly's (RID 1, tag 14 => 46), so serialization must
    // reorder the rows.
    module.define_type(TypeDef::new(TypeAttributes::empty(), "", "<Module>"));
    let mut holder = TypeDef::new(TypeAttributes::PUBLIC, "", "Holder");
    holder.custom_attributes.push(attribute);
    module.define_type(holder);

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let (_, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();

    assert_eq!(tables.header.row_count(TableId::CustomAttribute), 2);
    let mut reader = tables.rows(TableId::CustomAttribute);
    let first = CustomAttributeRow::parse(&mut reader, &ctx).unwrap();
    let second = CustomAttributeRow::parse(&mut reader, &ctx).unwrap();

    assert_eq!(first.parent.table, Some(TableId::Assembly));
    assert_eq!(first.parent.row, 1);
    assert_eq!(first.attr_type.table, Some(TableId::MemberRef));
    assert_eq!(second.parent.table, Some(TableId::TypeDef));

    // Both attributes share one interned value blob.
    assert_eq!(first.value, second.value);
}

#[test]
fn identical_signatures_share_one_blob() {
    let mut module = Module::new("Sigs.dll");
    let locals = || {
        StandAloneSig {
            rid: 0,
            signature: StandAloneSignature::Locals(LocalVariablesSignature::new(vec![
                TypeSignature::I4,
            ])),
        }
    };
    let first = module.add_stand_alone_sig(locals());
    let second = module.add_stand_alone_sig(locals());

    let mut builder = MetadataBuilder::new(&module).unwrap();
    let first_token = builder.add_stand_alone_signature(first).unwrap();
    let second_token = builder.add_stand_alone_signature(second).unwrap();

    // Two distinct rows, idempotent per handle.
    assert_ne!(first_token, second_token);
    assert_eq!(builder.add_stand_alone_signature(first).unwrap(), first_token);

    let directory = builder.create_directory().unwrap();
    let (_, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();

    assert_eq!(tables.header.row_count(TableId::StandAloneSig), 2);
    let mut reader = tables.rows(TableId::StandAloneSig);
    let row_a = StandAloneSigRow::parse(&mut reader, &ctx).unwrap();
    let row_b = StandAloneSigRow::parse(&mut reader, &ctx).unwrap();
    assert_eq!(row_a.signature, row_b.signature);
}

#[test]
fn oversized_strings_heap_promotes_index_width() {
    let mut module = Module::new("Big.dll");
    module.assembly = Some(AssemblyDef::new("Big", (1, 0, 0, 0)));

    let mut holder = TypeDef::new(TypeAttributes::PUBLIC, "", "Holder");
    let long_name = "f".repeat(0x11000);
    let field = module.define_field(FieldDef::new(
        Default::default(),
        long_name,
        FieldSignature::new(TypeSignature::I4),
    ));
    holder.fields.push(field);
    module.define_type(holder);

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let (root, tables) = Tables::parse(&directory);

    // Bit 0: #Strings uses 4-byte indices.
    assert_eq!(tables.header.heap_sizes & 0x01, 0x01);
    let ctx = tables.ctx();
    assert_eq!(ctx.string_index_size(), 4);
    // Module row: generation(2) + name(4) + 3 GUID indices(2 each).
    assert_eq!(ctx.row_size(TableId::Module), 12);

    let module_row = ModuleRow::parse(&mut tables.rows(TableId::Module), &ctx).unwrap();
    let strings = stream_bytes(&directory, &root, "#Strings");
    assert_eq!(heap_string(strings, module_row.name), "Big.dll");
}

#[test]
fn preferred_rids_are_preserved() {
    let mut module = Module::new("Rids.dll");
    let corlib = module.add_assembly_ref(AssemblyRef::new("System.Runtime", (8, 0, 0, 0)));

    let mut second = TypeRef::new(ResolutionScopeRef::AssemblyRef(corlib), "System", "Object");
    second.rid = 2;
    let mut first = TypeRef::new(ResolutionScopeRef::AssemblyRef(corlib), "System", "String");
    first.rid = 1;
    // Imported out of RID order.
    let second_id = module.add_type_ref(second);
    let first_id = module.add_type_ref(first);

    let mut builder = MetadataBuilder::new(&module).unwrap();
    let second_token = builder.add_type_reference(second_id).unwrap();
    let first_token = builder.add_type_reference(first_id).unwrap();
    assert_eq!(second_token.rid(), 2);
    assert_eq!(first_token.rid(), 1);

    let directory = builder.create_directory().unwrap();
    let (root, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();

    let strings = stream_bytes(&directory, &root, "#Strings");
    let mut reader = tables.rows(TableId::TypeRef);
    let row_one = clremit::tables::TypeRefRow::parse(&mut reader, &ctx).unwrap();
    let row_two = clremit::tables::TypeRefRow::parse(&mut reader, &ctx).unwrap();
    assert_eq!(heap_string(strings, row_one.type_name), "String");
    assert_eq!(heap_string(strings, row_two.type_name), "Object");
}

#[test]
fn foreign_member_is_rejected() {
    let module = Module::new("A.dll");
    let mut other = Module::new("B.dll");
    let foreign = other.add_assembly_ref(AssemblyRef::new("System.Runtime", (8, 0, 0, 0)));

    let mut builder = MetadataBuilder::new(&module).unwrap();
    let err = builder.add_assembly_reference(foreign).unwrap_err();
    assert!(matches!(err, clremit::Error::MemberNotImported { .. }));
}

#[test]
fn embedded_resources_are_length_prefixed() {
    let mut module = Module::new("Res.dll");
    module.assembly = Some(AssemblyDef::new("Res", (1, 0, 0, 0)));
    module.add_resource(clremit::model::ManifestResource {
        rid: 0,
        attributes: clremit::attributes::ManifestResourceAttributes::PUBLIC,
        name: "data.bin".to_string(),
        data: clremit::model::ResourceData::Embedded(vec![1, 2, 3, 4, 5]),
    });

    let directory = MetadataBuilder::new(&module)
        .unwrap()
        .create_directory()
        .unwrap();
    let resources = directory.resources.as_ref().unwrap();
    assert_eq!(&resources[0..4], &5u32.to_le_bytes());
    assert_eq!(&resources[4..9], &[1, 2, 3, 4, 5]);

    let (_, tables) = Tables::parse(&directory);
    let ctx = tables.ctx();
    let row = clremit::tables::ManifestResourceRow::parse(
        &mut tables.rows(TableId::ManifestResource),
        &ctx,
    )
    .unwrap();
    assert_eq!(row.offset, 0);
    assert!(row.implementation.is_null());
}

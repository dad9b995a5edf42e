//! Row buffers for the 45 metadata tables.
//!
//! [`Table`] is an append-mostly arena that assigns RIDs, honoring preferred
//! RIDs from the source graph by growing placeholder slots. [`TablesBuffer`]
//! owns one table per id, applies the ECMA-mandated sort orders (remapping
//! the columns that reference sortable tables) and serializes the `#~`
//! stream.

use tracing::trace;

use crate::error::{Error, Result};
use crate::tables::{
    AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow, AssemblyRefRow,
    AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow, DeclSecurityRow, EncLogRow,
    EncMapRow, EventMapRow, EventPtrRow, EventRow, ExportedTypeRow, FieldLayoutRow,
    FieldMarshalRow, FieldPtrRow, FieldRow, FieldRvaRow, FileRow, GenericParamConstraintRow,
    GenericParamRow, ImplMapRow, InterfaceImplRow, ManifestResourceRow, MemberRefRow,
    MethodDefRow, MethodImplRow, MethodPtrRow, MethodSemanticsRow, MethodSpecRow, ModuleRefRow,
    ModuleRow, NestedClassRow, ParamPtrRow, ParamRow, PropertyMapRow, PropertyPtrRow, PropertyRow,
    StandAloneSigRow, TableContext, TableId, TablesHeader, TypeDefRow, TypeRefRow, TypeSpecRow,
};
#[cfg(test)]
use crate::tables::CodedIndex;
use crate::tables::{CodedIndexEncoder, CodedIndexKind};
use crate::writer::Writer;

/// RIDs are 24-bit; a table can never hold more rows than this.
const MAX_RID: usize = 0x00FF_FFFF;

/// A single metadata table: a RID-indexed arena of rows.
///
/// Slots reserved through a preferred RID but not yet filled hold `None`;
/// they must all be filled before serialization.
#[derive(Debug, Clone)]
pub struct Table<R> {
    id: TableId,
    /// When set, a preferred-RID collision is an error instead of an append.
    /// Used for the member-list tables where silent reordering would break
    /// the owner's contiguous range.
    strict_rids: bool,
    rows: Vec<Option<R>>,
}

impl<R> Table<R> {
    fn new(id: TableId, strict_rids: bool) -> Self {
        Self {
            id,
            strict_rids,
            rows: Vec::new(),
        }
    }

    /// Number of rows (placeholders included).
    #[must_use]
    pub fn len(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The RID the next appended row will receive.
    #[must_use]
    pub fn next_rid(&self) -> u32 {
        self.rows.len() as u32 + 1
    }

    /// Get a row by RID.
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<&R> {
        self.rows.get(rid.checked_sub(1)? as usize)?.as_ref()
    }

    /// Get a mutable row by RID.
    pub fn get_mut(&mut self, rid: u32) -> Option<&mut R> {
        self.rows.get_mut(rid.checked_sub(1)? as usize)?.as_mut()
    }

    fn check_capacity(&self, wanted: usize) -> Result<()> {
        if wanted > MAX_RID {
            return Err(Error::IndexOverflow {
                what: self.id.name(),
                size: wanted as u64,
            });
        }
        Ok(())
    }

    /// Add a row, honoring a preferred RID when possible.
    ///
    /// A preferred RID of 0 appends. A preferred RID beyond the current row
    /// count grows the table with placeholder slots. A collision with an
    /// occupied slot appends, unless the table uses strict RIDs, in which
    /// case it is a [`Error::DuplicateRid`].
    pub fn add(&mut self, row: R, preferred_rid: u32) -> Result<u32> {
        if preferred_rid == 0 {
            return self.push(row);
        }

        let slot = preferred_rid as usize - 1;
        if slot >= self.rows.len() {
            self.check_capacity(preferred_rid as usize)?;
            self.rows.resize_with(preferred_rid as usize, || None);
            self.rows[slot] = Some(row);
            return Ok(preferred_rid);
        }

        if self.rows[slot].is_none() {
            self.rows[slot] = Some(row);
            return Ok(preferred_rid);
        }

        if self.strict_rids {
            return Err(Error::DuplicateRid {
                table: self.id.name(),
                rid: preferred_rid,
            });
        }
        self.push(row)
    }

    /// Append a row and return its RID.
    pub fn push(&mut self, row: R) -> Result<u32> {
        self.check_capacity(self.rows.len() + 1)?;
        self.rows.push(Some(row));
        Ok(self.rows.len() as u32)
    }

    /// Reserve a RID (preferred or fresh) to be filled later.
    pub fn reserve(&mut self, preferred_rid: u32) -> Result<u32> {
        if preferred_rid == 0 {
            self.check_capacity(self.rows.len() + 1)?;
            self.rows.push(None);
            return Ok(self.rows.len() as u32);
        }

        let slot = preferred_rid as usize - 1;
        if slot >= self.rows.len() {
            self.check_capacity(preferred_rid as usize)?;
            self.rows.resize_with(preferred_rid as usize, || None);
            return Ok(preferred_rid);
        }

        if self.rows[slot].is_some() && self.strict_rids {
            return Err(Error::DuplicateRid {
                table: self.id.name(),
                rid: preferred_rid,
            });
        }
        if self.rows[slot].is_some() {
            self.rows.push(None);
            return Ok(self.rows.len() as u32);
        }
        Ok(preferred_rid)
    }

    /// Fill a previously reserved slot.
    pub fn fill(&mut self, rid: u32, row: R) {
        self.rows[rid as usize - 1] = Some(row);
    }

    /// Verify no placeholder slot is left unfilled.
    pub fn validate(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.is_none() {
                return Err(Error::UnfilledRow {
                    table: self.id.name(),
                    rid: i as u32 + 1,
                });
            }
        }
        Ok(())
    }

    /// Iterate over the filled rows in RID order.
    pub fn rows(&self) -> impl Iterator<Item = &R> {
        self.rows.iter().flatten()
    }

    /// Stable-sort the rows by a key, returning the old-RID → new-RID map
    /// (indexed by `old_rid - 1`). Fails if any slot is unfilled.
    pub fn sort_by_key<K: Ord>(&mut self, key: impl Fn(&R) -> K) -> Result<Vec<u32>> {
        self.validate()?;
        let mut indexed: Vec<(usize, R)> = std::mem::take(&mut self.rows)
            .into_iter()
            .flatten()
            .enumerate()
            .collect();
        indexed.sort_by(|(ai, a), (bi, b)| key(a).cmp(&key(b)).then(ai.cmp(bi)));

        let mut map = vec![0u32; indexed.len()];
        for (new_index, (old_index, _)) in indexed.iter().enumerate() {
            map[*old_index] = new_index as u32 + 1;
        }
        self.rows = indexed.into_iter().map(|(_, row)| Some(row)).collect();
        Ok(map)
    }
}

/// Remap a 1-based RID through a sort permutation. RID 0 stays null.
fn remap(rid: u32, map: &[u32]) -> u32 {
    if rid == 0 {
        0
    } else {
        map[rid as usize - 1]
    }
}

/// The 45 metadata tables of one directory under construction.
#[derive(Debug, Clone)]
pub struct TablesBuffer {
    pub module: Table<ModuleRow>,
    pub type_ref: Table<TypeRefRow>,
    pub type_def: Table<TypeDefRow>,
    pub field_ptr: Table<FieldPtrRow>,
    pub field: Table<FieldRow>,
    pub method_ptr: Table<MethodPtrRow>,
    pub method_def: Table<MethodDefRow>,
    pub param_ptr: Table<ParamPtrRow>,
    pub param: Table<ParamRow>,
    pub interface_impl: Table<InterfaceImplRow>,
    pub member_ref: Table<MemberRefRow>,
    pub constant: Table<ConstantRow>,
    pub custom_attribute: Table<CustomAttributeRow>,
    pub field_marshal: Table<FieldMarshalRow>,
    pub decl_security: Table<DeclSecurityRow>,
    pub class_layout: Table<ClassLayoutRow>,
    pub field_layout: Table<FieldLayoutRow>,
    pub stand_alone_sig: Table<StandAloneSigRow>,
    pub event_map: Table<EventMapRow>,
    pub event_ptr: Table<EventPtrRow>,
    pub event: Table<EventRow>,
    pub property_map: Table<PropertyMapRow>,
    pub property_ptr: Table<PropertyPtrRow>,
    pub property: Table<PropertyRow>,
    pub method_semantics: Table<MethodSemanticsRow>,
    pub method_impl: Table<MethodImplRow>,
    pub module_ref: Table<ModuleRefRow>,
    pub type_spec: Table<TypeSpecRow>,
    pub impl_map: Table<ImplMapRow>,
    pub field_rva: Table<FieldRvaRow>,
    pub enc_log: Table<EncLogRow>,
    pub enc_map: Table<EncMapRow>,
    pub assembly: Table<AssemblyRow>,
    pub assembly_processor: Table<AssemblyProcessorRow>,
    pub assembly_os: Table<AssemblyOsRow>,
    pub assembly_ref: Table<AssemblyRefRow>,
    pub assembly_ref_processor: Table<AssemblyRefProcessorRow>,
    pub assembly_ref_os: Table<AssemblyRefOsRow>,
    pub file: Table<FileRow>,
    pub exported_type: Table<ExportedTypeRow>,
    pub manifest_resource: Table<ManifestResourceRow>,
    pub nested_class: Table<NestedClassRow>,
    pub generic_param: Table<GenericParamRow>,
    pub method_spec: Table<MethodSpecRow>,
    pub generic_param_constraint: Table<GenericParamConstraintRow>,
}

impl Default for TablesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TablesBuffer {
    /// Create an empty set of tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            module: Table::new(TableId::Module, false),
            type_ref: Table::new(TableId::TypeRef, false),
            // Member-list owners use strict RIDs: a silent append on
            // collision would break field_list/method_list/param_list
            // contiguity.
            type_def: Table::new(TableId::TypeDef, true),
            field_ptr: Table::new(TableId::FieldPtr, false),
            field: Table::new(TableId::Field, true),
            method_ptr: Table::new(TableId::MethodPtr, false),
            method_def: Table::new(TableId::MethodDef, true),
            param_ptr: Table::new(TableId::ParamPtr, false),
            param: Table::new(TableId::Param, true),
            interface_impl: Table::new(TableId::InterfaceImpl, false),
            member_ref: Table::new(TableId::MemberRef, false),
            constant: Table::new(TableId::Constant, false),
            custom_attribute: Table::new(TableId::CustomAttribute, false),
            field_marshal: Table::new(TableId::FieldMarshal, false),
            decl_security: Table::new(TableId::DeclSecurity, false),
            class_layout: Table::new(TableId::ClassLayout, false),
            field_layout: Table::new(TableId::FieldLayout, false),
            stand_alone_sig: Table::new(TableId::StandAloneSig, false),
            event_map: Table::new(TableId::EventMap, false),
            event_ptr: Table::new(TableId::EventPtr, false),
            event: Table::new(TableId::Event, false),
            property_map: Table::new(TableId::PropertyMap, false),
            property_ptr: Table::new(TableId::PropertyPtr, false),
            property: Table::new(TableId::Property, false),
            method_semantics: Table::new(TableId::MethodSemantics, false),
            method_impl: Table::new(TableId::MethodImpl, false),
            module_ref: Table::new(TableId::ModuleRef, false),
            type_spec: Table::new(TableId::TypeSpec, false),
            impl_map: Table::new(TableId::ImplMap, false),
            field_rva: Table::new(TableId::FieldRva, false),
            enc_log: Table::new(TableId::EncLog, false),
            enc_map: Table::new(TableId::EncMap, false),
            assembly: Table::new(TableId::Assembly, false),
            assembly_processor: Table::new(TableId::AssemblyProcessor, false),
            assembly_os: Table::new(TableId::AssemblyOs, false),
            assembly_ref: Table::new(TableId::AssemblyRef, false),
            assembly_ref_processor: Table::new(TableId::AssemblyRefProcessor, false),
            assembly_ref_os: Table::new(TableId::AssemblyRefOs, false),
            file: Table::new(TableId::File, false),
            exported_type: Table::new(TableId::ExportedType, false),
            manifest_resource: Table::new(TableId::ManifestResource, false),
            nested_class: Table::new(TableId::NestedClass, false),
            generic_param: Table::new(TableId::GenericParam, false),
            method_spec: Table::new(TableId::MethodSpec, false),
            generic_param_constraint: Table::new(TableId::GenericParamConstraint, false),
        }
    }

    /// Current row counts, indexed by table id.
    #[must_use]
    pub fn row_counts(&self) -> [u32; 64] {
        let mut counts = [0u32; 64];
        counts[TableId::Module as usize] = self.module.len();
        counts[TableId::TypeRef as usize] = self.type_ref.len();
        counts[TableId::TypeDef as usize] = self.type_def.len();
        counts[TableId::FieldPtr as usize] = self.field_ptr.len();
        counts[TableId::Field as usize] = self.field.len();
        counts[TableId::MethodPtr as usize] = self.method_ptr.len();
        counts[TableId::MethodDef as usize] = self.method_def.len();
        counts[TableId::ParamPtr as usize] = self.param_ptr.len();
        counts[TableId::Param as usize] = self.param.len();
        counts[TableId::InterfaceImpl as usize] = self.interface_impl.len();
        counts[TableId::MemberRef as usize] = self.member_ref.len();
        counts[TableId::Constant as usize] = self.constant.len();
        counts[TableId::CustomAttribute as usize] = self.custom_attribute.len();
        counts[TableId::FieldMarshal as usize] = self.field_marshal.len();
        counts[TableId::DeclSecurity as usize] = self.decl_security.len();
        counts[TableId::ClassLayout as usize] = self.class_layout.len();
        counts[TableId::FieldLayout as usize] = self.field_layout.len();
        counts[TableId::StandAloneSig as usize] = self.stand_alone_sig.len();
        counts[TableId::EventMap as usize] = self.event_map.len();
        counts[TableId::EventPtr as usize] = self.event_ptr.len();
        counts[TableId::Event as usize] = self.event.len();
        counts[TableId::PropertyMap as usize] = self.property_map.len();
        counts[TableId::PropertyPtr as usize] = self.property_ptr.len();
        counts[TableId::Property as usize] = self.property.len();
        counts[TableId::MethodSemantics as usize] = self.method_semantics.len();
        counts[TableId::MethodImpl as usize] = self.method_impl.len();
        counts[TableId::ModuleRef as usize] = self.module_ref.len();
        counts[TableId::TypeSpec as usize] = self.type_spec.len();
        counts[TableId::ImplMap as usize] = self.impl_map.len();
        counts[TableId::FieldRva as usize] = self.field_rva.len();
        counts[TableId::EncLog as usize] = self.enc_log.len();
        counts[TableId::EncMap as usize] = self.enc_map.len();
        counts[TableId::Assembly as usize] = self.assembly.len();
        counts[TableId::AssemblyProcessor as usize] = self.assembly_processor.len();
        counts[TableId::AssemblyOs as usize] = self.assembly_os.len();
        counts[TableId::AssemblyRef as usize] = self.assembly_ref.len();
        counts[TableId::AssemblyRefProcessor as usize] = self.assembly_ref_processor.len();
        counts[TableId::AssemblyRefOs as usize] = self.assembly_ref_os.len();
        counts[TableId::File as usize] = self.file.len();
        counts[TableId::ExportedType as usize] = self.exported_type.len();
        counts[TableId::ManifestResource as usize] = self.manifest_resource.len();
        counts[TableId::NestedClass as usize] = self.nested_class.len();
        counts[TableId::GenericParam as usize] = self.generic_param.len();
        counts[TableId::MethodSpec as usize] = self.method_spec.len();
        counts[TableId::GenericParamConstraint as usize] = self.generic_param_constraint.len();
        counts
    }

    /// Create a context for the current row counts.
    #[must_use]
    pub fn context(&self, heap_sizes: u8) -> TableContext {
        TableContext::new(heap_sizes, self.row_counts())
    }

    /// Get a coded-index encoder scoped to the current row counts.
    #[must_use]
    pub fn index_encoder(&self, kind: CodedIndexKind) -> CodedIndexEncoder {
        CodedIndexEncoder::new(kind, self.context(0).wide_coded_index(kind))
    }

    /// Verify that every reserved slot has been filled.
    pub fn validate(&self) -> Result<()> {
        self.module.validate()?;
        self.type_ref.validate()?;
        self.type_def.validate()?;
        self.field_ptr.validate()?;
        self.field.validate()?;
        self.method_ptr.validate()?;
        self.method_def.validate()?;
        self.param_ptr.validate()?;
        self.param.validate()?;
        self.interface_impl.validate()?;
        self.member_ref.validate()?;
        self.constant.validate()?;
        self.custom_attribute.validate()?;
        self.field_marshal.validate()?;
        self.decl_security.validate()?;
        self.class_layout.validate()?;
        self.field_layout.validate()?;
        self.stand_alone_sig.validate()?;
        self.event_map.validate()?;
        self.event_ptr.validate()?;
        self.event.validate()?;
        self.property_map.validate()?;
        self.property_ptr.validate()?;
        self.property.validate()?;
        self.method_semantics.validate()?;
        self.method_impl.validate()?;
        self.module_ref.validate()?;
        self.type_spec.validate()?;
        self.impl_map.validate()?;
        self.field_rva.validate()?;
        self.enc_log.validate()?;
        self.enc_map.validate()?;
        self.assembly.validate()?;
        self.assembly_processor.validate()?;
        self.assembly_os.validate()?;
        self.assembly_ref.validate()?;
        self.assembly_ref_processor.validate()?;
        self.assembly_ref_os.validate()?;
        self.file.validate()?;
        self.exported_type.validate()?;
        self.manifest_resource.validate()?;
        self.nested_class.validate()?;
        self.generic_param.validate()?;
        self.method_spec.validate()?;
        self.generic_param_constraint.validate()
    }

    /// Remap `CustomAttribute.parent` rows that point at a re-sorted table.
    fn remap_attribute_parents(&mut self, table: TableId, map: &[u32]) {
        for row in self.custom_attribute.rows.iter_mut().flatten() {
            if row.parent.table == Some(table) {
                row.parent.row = remap(row.parent.row, map);
            }
        }
    }

    /// Apply the ECMA sort orders (II.24.2.6 "sorted" tables).
    ///
    /// Tables whose rows are referenced elsewhere by RID or coded index are
    /// sorted first, and the referencing columns rewritten through the sort
    /// permutation; CustomAttribute is sorted last since its parent column
    /// can point into three of the sortable tables.
    fn sort(&mut self) -> Result<()> {
        let map = self
            .interface_impl
            .sort_by_key(|r| (r.class, r.interface.encode(CodedIndexKind::TypeDefOrRef)))?;
        self.remap_attribute_parents(TableId::InterfaceImpl, &map);

        let map = self.generic_param.sort_by_key(|r| {
            (r.owner.encode(CodedIndexKind::TypeOrMethodDef), r.number)
        })?;
        for row in self.generic_param_constraint.rows.iter_mut().flatten() {
            row.owner = remap(row.owner, &map);
        }
        self.remap_attribute_parents(TableId::GenericParam, &map);

        let map = self.generic_param_constraint.sort_by_key(|r| r.owner)?;
        self.remap_attribute_parents(TableId::GenericParamConstraint, &map);

        self.constant
            .sort_by_key(|r| r.parent.encode(CodedIndexKind::HasConstant))?;
        self.field_marshal
            .sort_by_key(|r| r.parent.encode(CodedIndexKind::HasFieldMarshal))?;
        self.decl_security
            .sort_by_key(|r| r.parent.encode(CodedIndexKind::HasDeclSecurity))?;
        self.class_layout.sort_by_key(|r| r.parent)?;
        self.field_layout.sort_by_key(|r| r.field)?;
        self.method_semantics
            .sort_by_key(|r| r.association.encode(CodedIndexKind::HasSemantics))?;
        self.method_impl.sort_by_key(|r| r.class)?;
        self.impl_map
            .sort_by_key(|r| r.member_forwarded.encode(CodedIndexKind::MemberForwarded))?;
        self.field_rva.sort_by_key(|r| r.field)?;
        self.nested_class.sort_by_key(|r| r.nested_class)?;

        self.custom_attribute
            .sort_by_key(|r| r.parent.encode(CodedIndexKind::HasCustomAttribute))?;
        Ok(())
    }

    /// Serialize the `#~` stream: header, row counts, and all rows in table
    /// order. Sorts the tables that require it first.
    pub fn serialize(&mut self, heap_sizes: u8) -> Result<Vec<u8>> {
        self.validate()?;
        self.sort()?;

        let mut header = TablesHeader {
            heap_sizes,
            ..TablesHeader::default()
        };
        let counts = self.row_counts();
        for table in crate::tables::ALL_TABLES {
            header.set_row_count(table, counts[table as usize]);
        }

        let ctx = header.context();
        let mut writer = Writer::new();
        header.write_to(&mut writer);
        trace!(
            valid = format_args!("{:#018X}", header.valid),
            header_size = header.size(),
            "serializing tables stream"
        );

        // Rows in table-id order.
        // 0x00 Module
        for row in self.module.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x01 TypeRef
        for row in self.type_ref.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x02 TypeDef
        for row in self.type_def.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x03 FieldPtr
        for row in self.field_ptr.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x04 Field
        for row in self.field.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x05 MethodPtr
        for row in self.method_ptr.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x06 MethodDef
        for row in self.method_def.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x07 ParamPtr
        for row in self.param_ptr.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x08 Param
        for row in self.param.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x09 InterfaceImpl
        for row in self.interface_impl.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0A MemberRef
        for row in self.member_ref.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0B Constant
        for row in self.constant.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0C CustomAttribute
        for row in self.custom_attribute.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0D FieldMarshal
        for row in self.field_marshal.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0E DeclSecurity
        for row in self.decl_security.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x0F ClassLayout
        for row in self.class_layout.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x10 FieldLayout
        for row in self.field_layout.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x11 StandAloneSig
        for row in self.stand_alone_sig.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x12 EventMap
        for row in self.event_map.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x13 EventPtr
        for row in self.event_ptr.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x14 Event
        for row in self.event.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x15 PropertyMap
        for row in self.property_map.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x16 PropertyPtr
        for row in self.property_ptr.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x17 Property
        for row in self.property.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x18 MethodSemantics
        for row in self.method_semantics.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x19 MethodImpl
        for row in self.method_impl.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1A ModuleRef
        for row in self.module_ref.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1B TypeSpec
        for row in self.type_spec.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1C ImplMap
        for row in self.impl_map.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1D FieldRva
        for row in self.field_rva.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1E EncLog
        for row in self.enc_log.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x1F EncMap
        for row in self.enc_map.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x20 Assembly
        for row in self.assembly.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x21 AssemblyProcessor
        for row in self.assembly_processor.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x22 AssemblyOs
        for row in self.assembly_os.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x23 AssemblyRef
        for row in self.assembly_ref.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x24 AssemblyRefProcessor
        for row in self.assembly_ref_processor.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x25 AssemblyRefOs
        for row in self.assembly_ref_os.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x26 File
        for row in self.file.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x27 ExportedType
        for row in self.exported_type.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x28 ManifestResource
        for row in self.manifest_resource.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x29 NestedClass
        for row in self.nested_class.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x2A GenericParam
        for row in self.generic_param.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x2B MethodSpec
        for row in self.method_spec.rows() {
            row.write(&mut writer, &ctx);
        }
        // 0x2C GenericParamConstraint
        for row in self.generic_param_constraint.rows() {
            row.write(&mut writer, &ctx);
        }

        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequential_rids() {
        let mut table = Table::new(TableId::TypeRef, false);
        assert_eq!(table.add(TypeRefRow::default(), 0).unwrap(), 1);
        assert_eq!(table.add(TypeRefRow::default(), 0).unwrap(), 2);
        assert_eq!(table.next_rid(), 3);
    }

    #[test]
    fn test_preferred_rid_grows_placeholders() {
        let mut table = Table::new(TableId::TypeRef, false);
        assert_eq!(table.add(TypeRefRow::default(), 3).unwrap(), 3);
        assert_eq!(table.len(), 3);
        // Slots 1 and 2 are placeholders.
        assert!(table.validate().is_err());
        table.fill(1, TypeRefRow::default());
        table.fill(2, TypeRefRow::default());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_occupied_preferred_rid_appends() {
        let mut table = Table::new(TableId::TypeRef, false);
        table.add(TypeRefRow::default(), 1).unwrap();
        // Collision on a lax table appends.
        assert_eq!(table.add(TypeRefRow::default(), 1).unwrap(), 2);
    }

    #[test]
    fn test_occupied_preferred_rid_is_error_on_strict_table() {
        let mut table = Table::new(TableId::TypeDef, true);
        table.add(TypeDefRow::default(), 1).unwrap();
        let err = table.add(TypeDefRow::default(), 1).unwrap_err();
        assert!(matches!(err, Error::DuplicateRid { rid: 1, .. }));
    }

    #[test]
    fn test_unfilled_row_fails_serialization() {
        let mut buffer = TablesBuffer::new();
        buffer.type_def.reserve(0).unwrap();
        let err = buffer.serialize(0).unwrap_err();
        assert!(matches!(err, Error::UnfilledRow { rid: 1, .. }));
    }

    #[test]
    fn test_sort_returns_permutation() {
        let mut table = Table::new(TableId::ClassLayout, false);
        table
            .push(ClassLayoutRow {
                packing_size: 0,
                class_size: 8,
                parent: 3,
            })
            .unwrap();
        table
            .push(ClassLayoutRow {
                packing_size: 0,
                class_size: 4,
                parent: 1,
            })
            .unwrap();
        let map = table.sort_by_key(|r| r.parent).unwrap();
        assert_eq!(map, vec![2, 1]);
        assert_eq!(table.get(1).unwrap().parent, 1);
        assert_eq!(table.get(2).unwrap().parent, 3);
    }

    #[test]
    fn test_index_encoder_tracks_row_counts() {
        use crate::token::MetadataToken;

        let mut buffer = TablesBuffer::new();
        let encoder = buffer.index_encoder(CodedIndexKind::TypeDefOrRef);
        assert!(!encoder.is_wide());
        let token = MetadataToken::new(TableId::TypeRef, 3);
        assert_eq!(encoder.encode(token), (3 << 2) | 1);

        // Enough TypeRef rows force the 4-byte width.
        for _ in 0..CodedIndexKind::TypeDefOrRef.max_small_rows() {
            buffer.type_ref.push(TypeRefRow::default()).unwrap();
        }
        assert!(buffer.index_encoder(CodedIndexKind::TypeDefOrRef).is_wide());

        let mut writer = Writer::new();
        buffer
            .index_encoder(CodedIndexKind::TypeDefOrRef)
            .write(&mut writer, token);
        assert_eq!(writer.len(), 4);
    }

    #[test]
    fn test_generic_param_sort_remaps_constraints() {
        let mut buffer = TablesBuffer::new();
        // Owner MethodDef RID 1 => coded (1 << 1) | 1 = 3;
        // owner TypeDef RID 1 => coded (1 << 1) | 0 = 2. Insertion order is
        // deliberately unsorted.
        buffer
            .generic_param
            .push(GenericParamRow {
                number: 0,
                flags: 0,
                owner: CodedIndex {
                    table: Some(TableId::MethodDef),
                    row: 1,
                },
                name: 0,
            })
            .unwrap();
        buffer
            .generic_param
            .push(GenericParamRow {
                number: 0,
                flags: 0,
                owner: CodedIndex {
                    table: Some(TableId::TypeDef),
                    row: 1,
                },
                name: 0,
            })
            .unwrap();
        // Constraint on the method's generic param (RID 1 before sorting).
        buffer
            .generic_param_constraint
            .push(GenericParamConstraintRow {
                owner: 1,
                constraint: CodedIndex {
                    table: Some(TableId::TypeRef),
                    row: 1,
                },
            })
            .unwrap();

        buffer.sort().unwrap();
        // After sorting the method-owned param is RID 2.
        assert_eq!(
            buffer.generic_param.get(2).unwrap().owner.table,
            Some(TableId::MethodDef)
        );
        assert_eq!(buffer.generic_param_constraint.get(1).unwrap().owner, 2);
    }
}

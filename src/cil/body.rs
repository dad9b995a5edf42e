//! Method body serialization (ECMA-335 II.25.4).

use crate::cil::{OpCode, OperandKind};
use crate::error::{Error, Result};
use crate::model::{ItemRef, LocalVariablesSignature, TypeDefOrRef};
use crate::token::MetadataToken;
use crate::writer::Writer;

/// Method header flags (ECMA-335 II.25.4.4).
const TINY_FORMAT: u8 = 0x02;
const FAT_FORMAT: u16 = 0x03;
const FAT_MORE_SECTS: u16 = 0x08;
const FAT_INIT_LOCALS: u16 = 0x10;

/// Exception section kind bytes (ECMA-335 II.25.4.5).
const SECT_EH_TABLE: u8 = 0x01;
const SECT_FAT_FORMAT: u8 = 0x40;

/// Resolves CIL operands to metadata tokens during body serialization.
///
/// Implemented by the directory builder; passed into the serializer at call
/// time so the body code never holds a reference back into the builder.
pub trait TokenProvider {
    /// Get the token for a metadata item, importing it if necessary.
    fn item_token(&mut self, item: ItemRef) -> Result<MetadataToken>;

    /// Get the #US token (tag 0x70) for a string literal.
    fn string_token(&mut self, value: &str) -> Result<MetadataToken>;

    /// Get a StandAloneSig token for a local variables signature.
    fn locals_token(&mut self, locals: &LocalVariablesSignature) -> Result<MetadataToken>;

    /// Get the TypeDefOrRef token for an exception clause's catch type.
    fn catch_type_token(&mut self, ty: TypeDefOrRef) -> Result<MetadataToken>;
}

/// An instruction operand.
///
/// Branch displacements are relative to the end of the branch instruction
/// and are carried pre-resolved; the serializer honors whatever short/long
/// form the opcode dictates.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// A signed byte: `ldc.i4.s`, short branch displacements, alignment.
    Int8(i8),
    /// A 32-bit integer: `ldc.i4`, long branch displacements.
    Int32(i32),
    /// A 64-bit integer: `ldc.i8`.
    Int64(i64),
    /// A 32-bit float: `ldc.r4`.
    Float32(f32),
    /// A 64-bit float: `ldc.r8`.
    Float64(f64),
    /// A local or argument index.
    Var(u16),
    /// Jump table displacements for `switch`.
    Switch(Vec<i32>),
    /// A string literal for `ldstr`.
    String(String),
    /// A metadata item.
    Item(ItemRef),
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode.
    pub opcode: OpCode,
    /// The operand, matching the opcode's operand kind.
    pub operand: Operand,
}

impl Instruction {
    /// An instruction without an operand.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    /// An instruction with an operand.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self { opcode, operand }
    }
}

/// The kind of an exception handler clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHandlerKind {
    /// A typed catch clause.
    Catch(TypeDefOrRef),
    /// A filter clause; the offset is where the filter code starts.
    Filter {
        /// Code offset of the filter expression.
        offset: u32,
    },
    /// A finally clause.
    Finally,
    /// A fault clause.
    Fault,
}

impl ExceptionHandlerKind {
    fn flags(self) -> u32 {
        match self {
            Self::Catch(_) => 0x0000,
            Self::Filter { .. } => 0x0001,
            Self::Finally => 0x0002,
            Self::Fault => 0x0004,
        }
    }
}

/// One exception handler clause. Offsets and lengths are in code bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// The clause kind.
    pub kind: ExceptionHandlerKind,
    /// Offset of the protected region.
    pub try_offset: u32,
    /// Length of the protected region.
    pub try_length: u32,
    /// Offset of the handler.
    pub handler_offset: u32,
    /// Length of the handler.
    pub handler_length: u32,
}

impl ExceptionHandler {
    /// Check if the clause fits the small exception-section format.
    fn fits_small(&self) -> bool {
        self.try_offset <= 0xFFFF
            && self.try_length <= 0xFF
            && self.handler_offset <= 0xFFFF
            && self.handler_length <= 0xFF
    }
}

/// A CIL method body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Maximum operand stack depth.
    pub max_stack: u16,
    /// Whether locals are zero-initialized.
    pub init_locals: bool,
    /// Local variable types.
    pub locals: LocalVariablesSignature,
    /// The instruction stream, offsets already resolved.
    pub instructions: Vec<Instruction>,
    /// Exception handler clauses.
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Create a body from an instruction stream.
    #[must_use]
    pub fn new(max_stack: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            max_stack,
            init_locals: true,
            locals: LocalVariablesSignature::default(),
            instructions,
            exception_handlers: Vec::new(),
        }
    }
}

/// Concatenation buffer for serialized method bodies.
///
/// The produced directory hands this segment to the PE emitter; MethodDef
/// RVA columns hold offsets into it.
#[derive(Debug, Clone, Default)]
pub struct MethodBodyBuffer {
    writer: Writer,
}

impl MethodBodyBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
        }
    }

    /// Total size of the buffer.
    #[must_use]
    pub fn size(&self) -> usize {
        self.writer.len()
    }

    /// Take the serialized segment.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Serialize a method body and return its offset within the segment.
    ///
    /// `method_name` is used for diagnostics only.
    pub fn serialize(
        &mut self,
        method_name: &str,
        body: &MethodBody,
        tokens: &mut dyn TokenProvider,
    ) -> Result<u32> {
        let code = serialize_code(method_name, &body.instructions, tokens)?;

        let is_tiny = code.len() < 64
            && body.max_stack <= 8
            && body.locals.is_empty()
            && body.exception_handlers.is_empty();

        if is_tiny {
            let offset = self.writer.len() as u32;
            self.writer.write_u8(((code.len() as u8) << 2) | TINY_FORMAT);
            self.writer.write_bytes(&code);
            return Ok(offset);
        }

        // Fat bodies start on a 4-byte boundary.
        self.writer.align(4);
        let offset = self.writer.len() as u32;

        let mut flags = FAT_FORMAT;
        if body.init_locals {
            flags |= FAT_INIT_LOCALS;
        }
        if !body.exception_handlers.is_empty() {
            flags |= FAT_MORE_SECTS;
        }

        let locals_token = if body.locals.is_empty() {
            MetadataToken::null()
        } else {
            tokens.locals_token(&body.locals)?
        };

        // 12-byte fat header: flags + header size (3 dwords) in the first
        // word, then max-stack, code size, locals token.
        self.writer.write_u16(flags | (3 << 12));
        self.writer.write_u16(body.max_stack);
        self.writer.write_u32(code.len() as u32);
        self.writer.write_u32(locals_token.as_u32());
        self.writer.write_bytes(&code);

        if !body.exception_handlers.is_empty() {
            self.writer.align(4);
            write_exception_section(&mut self.writer, &body.exception_handlers, tokens)?;
        }

        Ok(offset)
    }
}

/// Serialize the instruction stream with token fixups.
fn serialize_code(
    method_name: &str,
    instructions: &[Instruction],
    tokens: &mut dyn TokenProvider,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new();

    for instruction in instructions {
        let opcode = instruction.opcode;
        opcode.write(&mut writer);

        let mismatch = || Error::InvalidCil {
            method: method_name.to_string(),
            context: format!(
                "`{}` cannot encode operand {:?}",
                opcode.mnemonic(),
                instruction.operand
            ),
        };

        match (opcode.operand_kind(), &instruction.operand) {
            (OperandKind::InlineNone, Operand::None) => {}
            (OperandKind::ShortInlineI | OperandKind::ShortInlineBrTarget, Operand::Int8(v)) => {
                writer.write_u8(*v as u8);
            }
            (OperandKind::InlineI | OperandKind::InlineBrTarget, Operand::Int32(v)) => {
                writer.write_u32(*v as u32);
            }
            (OperandKind::InlineI8, Operand::Int64(v)) => {
                writer.write_u64(*v as u64);
            }
            (OperandKind::ShortInlineR, Operand::Float32(v)) => {
                writer.write_u32(v.to_bits());
            }
            (OperandKind::InlineR, Operand::Float64(v)) => {
                writer.write_u64(v.to_bits());
            }
            (OperandKind::ShortInlineVar, Operand::Var(v)) => {
                if *v > 0xFF {
                    return Err(Error::InvalidCil {
                        method: method_name.to_string(),
                        context: format!(
                            "`{}` variable index {v} does not fit the short form",
                            opcode.mnemonic()
                        ),
                    });
                }
                writer.write_u8(*v as u8);
            }
            (OperandKind::InlineVar, Operand::Var(v)) => {
                writer.write_u16(*v);
            }
            (OperandKind::InlineSwitch, Operand::Switch(targets)) => {
                writer.write_u32(targets.len() as u32);
                for target in targets {
                    writer.write_u32(*target as u32);
                }
            }
            (OperandKind::InlineString, Operand::String(value)) => {
                let token = tokens.string_token(value)?;
                writer.write_u32(token.as_u32());
            }
            (kind, Operand::Item(item)) if kind.is_token() => {
                let token = tokens.item_token(*item)?;
                writer.write_u32(token.as_u32());
            }
            _ => return Err(mismatch()),
        }
    }

    Ok(writer.into_inner())
}

/// Write the exception handler section following a fat body.
fn write_exception_section(
    writer: &mut Writer,
    handlers: &[ExceptionHandler],
    tokens: &mut dyn TokenProvider,
) -> Result<()> {
    // Resolve catch types up front; the section layout depends only on the
    // clause geometry.
    let mut class_tokens = Vec::with_capacity(handlers.len());
    for handler in handlers {
        class_tokens.push(match handler.kind {
            ExceptionHandlerKind::Catch(ty) => tokens.catch_type_token(ty)?.as_u32(),
            ExceptionHandlerKind::Filter { offset } => offset,
            _ => 0,
        });
    }

    let small = handlers.len() <= 20 && handlers.iter().all(ExceptionHandler::fits_small);
    if small {
        let data_size = handlers.len() * 12 + 4;
        writer.write_u8(SECT_EH_TABLE);
        writer.write_u8(data_size as u8);
        writer.write_u16(0);
        for (handler, class_token) in handlers.iter().zip(&class_tokens) {
            writer.write_u16(handler.kind.flags() as u16);
            writer.write_u16(handler.try_offset as u16);
            writer.write_u8(handler.try_length as u8);
            writer.write_u16(handler.handler_offset as u16);
            writer.write_u8(handler.handler_length as u8);
            writer.write_u32(*class_token);
        }
    } else {
        let data_size = (handlers.len() * 24 + 4) as u32;
        writer.write_u8(SECT_EH_TABLE | SECT_FAT_FORMAT);
        writer.write_u8(data_size as u8);
        writer.write_u8((data_size >> 8) as u8);
        writer.write_u8((data_size >> 16) as u8);
        for (handler, class_token) in handlers.iter().zip(&class_tokens) {
            writer.write_u32(handler.kind.flags());
            writer.write_u32(handler.try_offset);
            writer.write_u32(handler.try_length);
            writer.write_u32(handler.handler_offset);
            writer.write_u32(handler.handler_length);
            writer.write_u32(*class_token);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A provider with canned answers, for serializer-only tests.
    struct CannedTokens;

    impl TokenProvider for CannedTokens {
        fn item_token(&mut self, _item: ItemRef) -> Result<MetadataToken> {
            Ok(MetadataToken::new(crate::tables::TableId::MemberRef, 1))
        }

        fn string_token(&mut self, _value: &str) -> Result<MetadataToken> {
            Ok(MetadataToken::user_string(1))
        }

        fn locals_token(&mut self, _locals: &LocalVariablesSignature) -> Result<MetadataToken> {
            Ok(MetadataToken::new(crate::tables::TableId::StandAloneSig, 1))
        }

        fn catch_type_token(&mut self, _ty: TypeDefOrRef) -> Result<MetadataToken> {
            Ok(MetadataToken::new(crate::tables::TableId::TypeRef, 2))
        }
    }

    #[test]
    fn test_tiny_body() {
        let body = MethodBody::new(8, vec![Instruction::new(OpCode::ret)]);
        let mut buffer = MethodBodyBuffer::new();
        let offset = buffer.serialize("M", &body, &mut CannedTokens).unwrap();
        assert_eq!(offset, 0);
        // Tiny header: (1 << 2) | 0x02 = 0x06, then `ret`.
        assert_eq!(buffer.into_inner(), vec![0x06, 0x2A]);
    }

    #[test]
    fn test_ldstr_uses_user_string_token() {
        let body = MethodBody::new(
            8,
            vec![
                Instruction::with_operand(OpCode::ldstr, Operand::String("Hello".into())),
                Instruction::new(OpCode::pop),
                Instruction::new(OpCode::ret),
            ],
        );
        let mut buffer = MethodBodyBuffer::new();
        buffer.serialize("M", &body, &mut CannedTokens).unwrap();
        let bytes = buffer.into_inner();
        assert_eq!(bytes[1], 0x72);
        assert_eq!(&bytes[2..6], &0x7000_0001u32.to_le_bytes());
    }

    #[test]
    fn test_fat_body_for_large_stack() {
        let body = MethodBody::new(16, vec![Instruction::new(OpCode::ret)]);
        let mut buffer = MethodBodyBuffer::new();
        buffer.serialize("M", &body, &mut CannedTokens).unwrap();
        let bytes = buffer.into_inner();
        assert_eq!(bytes.len(), 13);
        // flags word: fat | init-locals | header size 3.
        let flags = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(flags, 0x3013);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 16);
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1);
        // No locals: null token.
        assert_eq!(
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            0
        );
    }

    #[test]
    fn test_fat_bodies_are_aligned() {
        let mut buffer = MethodBodyBuffer::new();
        let tiny = MethodBody::new(8, vec![Instruction::new(OpCode::ret)]);
        buffer.serialize("A", &tiny, &mut CannedTokens).unwrap();

        let fat = MethodBody::new(9, vec![Instruction::new(OpCode::ret)]);
        let offset = buffer.serialize("B", &fat, &mut CannedTokens).unwrap();
        assert_eq!(offset % 4, 0);
    }

    #[test]
    fn test_operand_mismatch_is_invalid_cil() {
        let body = MethodBody::new(
            8,
            vec![Instruction::with_operand(OpCode::ret, Operand::Int32(1))],
        );
        let mut buffer = MethodBodyBuffer::new();
        let err = buffer.serialize("M", &body, &mut CannedTokens).unwrap_err();
        assert!(matches!(err, Error::InvalidCil { .. }));
    }

    #[test]
    fn test_exception_section_small_form() {
        let mut body = MethodBody::new(
            9,
            vec![
                Instruction::new(OpCode::nop),
                Instruction::with_operand(OpCode::leave_s, Operand::Int8(1)),
                Instruction::new(OpCode::endfinally),
                Instruction::new(OpCode::ret),
            ],
        );
        body.exception_handlers.push(ExceptionHandler {
            kind: ExceptionHandlerKind::Finally,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 1,
        });
        let mut buffer = MethodBodyBuffer::new();
        buffer.serialize("M", &body, &mut CannedTokens).unwrap();
        let bytes = buffer.into_inner();

        // Code is 5 bytes; the section starts at the next 4-byte boundary
        // after the 12-byte header.
        let section = 12 + 5usize.next_multiple_of(4);
        assert_eq!(bytes[section], 0x01); // small EHTable
        assert_eq!(bytes[section + 1], 16); // 1 clause * 12 + 4
        let flags = u16::from_le_bytes([bytes[section + 4], bytes[section + 5]]);
        assert_eq!(flags, 0x0002); // finally
    }
}

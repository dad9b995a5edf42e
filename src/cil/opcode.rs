//! CIL opcode table (ECMA-335 VI Annex C).

use crate::writer::Writer;

/// Operand kinds of CIL instructions (ECMA-335 VI.C.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    InlineNone,
    ShortInlineI,
    InlineI,
    InlineI8,
    ShortInlineR,
    InlineR,
    ShortInlineVar,
    InlineVar,
    ShortInlineBrTarget,
    InlineBrTarget,
    InlineSwitch,
    InlineString,
    InlineField,
    InlineMethod,
    InlineType,
    InlineTok,
    InlineSig,
}

impl OperandKind {
    /// Check if the operand is encoded as a metadata token.
    #[must_use]
    pub fn is_token(self) -> bool {
        matches!(
            self,
            Self::InlineField | Self::InlineMethod | Self::InlineType | Self::InlineTok | Self::InlineSig
        )
    }
}

macro_rules! define_opcodes {
    (
        $(
            $(#[$attr:meta])*
            $ident:ident = ($code:literal, $operand:ident)
        ),* $(,)?
    ) => {
        /// CIL opcodes. `0xFE`-prefixed instructions carry two-byte codes.
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $(
                $(#[$attr])*
                $ident
            ),*
        }

        impl OpCode {
            /// The instruction's numeric code.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $(Self::$ident => $code),*
                }
            }

            /// The mnemonic, as written in disassembly.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$ident => stringify!($ident)),*
                }
            }

            /// The kind of operand the instruction takes.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $(Self::$ident => OperandKind::$operand),*
                }
            }
        }
    };
}

impl OpCode {
    /// Size of the opcode itself (1 or 2 bytes).
    #[must_use]
    pub const fn size(self) -> usize {
        if self.code() > 0xFF { 2 } else { 1 }
    }

    /// Emit the opcode bytes.
    pub fn write(self, writer: &mut Writer) {
        let code = self.code();
        if code > 0xFF {
            writer.write_u8((code >> 8) as u8);
        }
        writer.write_u8(code as u8);
    }
}

define_opcodes! {
    nop = (0x00, InlineNone),
    dbg_break = (0x01, InlineNone),
    ldarg_0 = (0x02, InlineNone),
    ldarg_1 = (0x03, InlineNone),
    ldarg_2 = (0x04, InlineNone),
    ldarg_3 = (0x05, InlineNone),
    ldloc_0 = (0x06, InlineNone),
    ldloc_1 = (0x07, InlineNone),
    ldloc_2 = (0x08, InlineNone),
    ldloc_3 = (0x09, InlineNone),
    stloc_0 = (0x0A, InlineNone),
    stloc_1 = (0x0B, InlineNone),
    stloc_2 = (0x0C, InlineNone),
    stloc_3 = (0x0D, InlineNone),
    ldarg_s = (0x0E, ShortInlineVar),
    ldarga_s = (0x0F, ShortInlineVar),
    starg_s = (0x10, ShortInlineVar),
    ldloc_s = (0x11, ShortInlineVar),
    ldloca_s = (0x12, ShortInlineVar),
    stloc_s = (0x13, ShortInlineVar),
    ldnull = (0x14, InlineNone),
    ldc_i4_m1 = (0x15, InlineNone),
    ldc_i4_0 = (0x16, InlineNone),
    ldc_i4_1 = (0x17, InlineNone),
    ldc_i4_2 = (0x18, InlineNone),
    ldc_i4_3 = (0x19, InlineNone),
    ldc_i4_4 = (0x1A, InlineNone),
    ldc_i4_5 = (0x1B, InlineNone),
    ldc_i4_6 = (0x1C, InlineNone),
    ldc_i4_7 = (0x1D, InlineNone),
    ldc_i4_8 = (0x1E, InlineNone),
    ldc_i4_s = (0x1F, ShortInlineI),
    ldc_i4 = (0x20, InlineI),
    ldc_i8 = (0x21, InlineI8),
    ldc_r4 = (0x22, ShortInlineR),
    ldc_r8 = (0x23, InlineR),
    dup = (0x25, InlineNone),
    pop = (0x26, InlineNone),
    jmp = (0x27, InlineMethod),
    call = (0x28, InlineMethod),
    calli = (0x29, InlineSig),
    ret = (0x2A, InlineNone),
    br_s = (0x2B, ShortInlineBrTarget),
    brfalse_s = (0x2C, ShortInlineBrTarget),
    brtrue_s = (0x2D, ShortInlineBrTarget),
    beq_s = (0x2E, ShortInlineBrTarget),
    bge_s = (0x2F, ShortInlineBrTarget),
    bgt_s = (0x30, ShortInlineBrTarget),
    ble_s = (0x31, ShortInlineBrTarget),
    blt_s = (0x32, ShortInlineBrTarget),
    bne_un_s = (0x33, ShortInlineBrTarget),
    bge_un_s = (0x34, ShortInlineBrTarget),
    bgt_un_s = (0x35, ShortInlineBrTarget),
    ble_un_s = (0x36, ShortInlineBrTarget),
    blt_un_s = (0x37, ShortInlineBrTarget),
    br = (0x38, InlineBrTarget),
    brfalse = (0x39, InlineBrTarget),
    brtrue = (0x3A, InlineBrTarget),
    beq = (0x3B, InlineBrTarget),
    bge = (0x3C, InlineBrTarget),
    bgt = (0x3D, InlineBrTarget),
    ble = (0x3E, InlineBrTarget),
    blt = (0x3F, InlineBrTarget),
    bne_un = (0x40, InlineBrTarget),
    bge_un = (0x41, InlineBrTarget),
    bgt_un = (0x42, InlineBrTarget),
    ble_un = (0x43, InlineBrTarget),
    blt_un = (0x44, InlineBrTarget),
    switch = (0x45, InlineSwitch),
    ldind_i1 = (0x46, InlineNone),
    ldind_u1 = (0x47, InlineNone),
    ldind_i2 = (0x48, InlineNone),
    ldind_u2 = (0x49, InlineNone),
    ldind_i4 = (0x4A, InlineNone),
    ldind_u4 = (0x4B, InlineNone),
    ldind_i8 = (0x4C, InlineNone),
    ldind_i = (0x4D, InlineNone),
    ldind_r4 = (0x4E, InlineNone),
    ldind_r8 = (0x4F, InlineNone),
    ldind_ref = (0x50, InlineNone),
    stind_ref = (0x51, InlineNone),
    stind_i1 = (0x52, InlineNone),
    stind_i2 = (0x53, InlineNone),
    stind_i4 = (0x54, InlineNone),
    stind_i8 = (0x55, InlineNone),
    stind_r4 = (0x56, InlineNone),
    stind_r8 = (0x57, InlineNone),
    add = (0x58, InlineNone),
    sub = (0x59, InlineNone),
    mul = (0x5A, InlineNone),
    div = (0x5B, InlineNone),
    div_un = (0x5C, InlineNone),
    rem = (0x5D, InlineNone),
    rem_un = (0x5E, InlineNone),
    and = (0x5F, InlineNone),
    or = (0x60, InlineNone),
    xor = (0x61, InlineNone),
    shl = (0x62, InlineNone),
    shr = (0x63, InlineNone),
    shr_un = (0x64, InlineNone),
    neg = (0x65, InlineNone),
    not = (0x66, InlineNone),
    conv_i1 = (0x67, InlineNone),
    conv_i2 = (0x68, InlineNone),
    conv_i4 = (0x69, InlineNone),
    conv_i8 = (0x6A, InlineNone),
    conv_r4 = (0x6B, InlineNone),
    conv_r8 = (0x6C, InlineNone),
    conv_u4 = (0x6D, InlineNone),
    conv_u8 = (0x6E, InlineNone),
    callvirt = (0x6F, InlineMethod),
    cpobj = (0x70, InlineType),
    ldobj = (0x71, InlineType),
    ldstr = (0x72, InlineString),
    newobj = (0x73, InlineMethod),
    castclass = (0x74, InlineType),
    isinst = (0x75, InlineType),
    conv_r_un = (0x76, InlineNone),
    unbox = (0x79, InlineType),
    throw = (0x7A, InlineNone),
    ldfld = (0x7B, InlineField),
    ldflda = (0x7C, InlineField),
    stfld = (0x7D, InlineField),
    ldsfld = (0x7E, InlineField),
    ldsflda = (0x7F, InlineField),
    stsfld = (0x80, InlineField),
    stobj = (0x81, InlineType),
    conv_ovf_i1_un = (0x82, InlineNone),
    conv_ovf_i2_un = (0x83, InlineNone),
    conv_ovf_i4_un = (0x84, InlineNone),
    conv_ovf_i8_un = (0x85, InlineNone),
    conv_ovf_u1_un = (0x86, InlineNone),
    conv_ovf_u2_un = (0x87, InlineNone),
    conv_ovf_u4_un = (0x88, InlineNone),
    conv_ovf_u8_un = (0x89, InlineNone),
    conv_ovf_i_un = (0x8A, InlineNone),
    conv_ovf_u_un = (0x8B, InlineNone),
    r#box = (0x8C, InlineType),
    newarr = (0x8D, InlineType),
    ldlen = (0x8E, InlineNone),
    ldelema = (0x8F, InlineType),
    ldelem_i1 = (0x90, InlineNone),
    ldelem_u1 = (0x91, InlineNone),
    ldelem_i2 = (0x92, InlineNone),
    ldelem_u2 = (0x93, InlineNone),
    ldelem_i4 = (0x94, InlineNone),
    ldelem_u4 = (0x95, InlineNone),
    ldelem_i8 = (0x96, InlineNone),
    ldelem_i = (0x97, InlineNone),
    ldelem_r4 = (0x98, InlineNone),
    ldelem_r8 = (0x99, InlineNone),
    ldelem_ref = (0x9A, InlineNone),
    stelem_i = (0x9B, InlineNone),
    stelem_i1 = (0x9C, InlineNone),
    stelem_i2 = (0x9D, InlineNone),
    stelem_i4 = (0x9E, InlineNone),
    stelem_i8 = (0x9F, InlineNone),
    stelem_r4 = (0xA0, InlineNone),
    stelem_r8 = (0xA1, InlineNone),
    stelem_ref = (0xA2, InlineNone),
    ldelem = (0xA3, InlineType),
    stelem = (0xA4, InlineType),
    unbox_any = (0xA5, InlineType),
    conv_ovf_i1 = (0xB3, InlineNone),
    conv_ovf_u1 = (0xB4, InlineNone),
    conv_ovf_i2 = (0xB5, InlineNone),
    conv_ovf_u2 = (0xB6, InlineNone),
    conv_ovf_i4 = (0xB7, InlineNone),
    conv_ovf_u4 = (0xB8, InlineNone),
    conv_ovf_i8 = (0xB9, InlineNone),
    conv_ovf_u8 = (0xBA, InlineNone),
    refanyval = (0xC2, InlineType),
    ckfinite = (0xC3, InlineNone),
    mkrefany = (0xC6, InlineType),
    ldtoken = (0xD0, InlineTok),
    conv_u2 = (0xD1, InlineNone),
    conv_u1 = (0xD2, InlineNone),
    conv_i = (0xD3, InlineNone),
    conv_ovf_i = (0xD4, InlineNone),
    conv_ovf_u = (0xD5, InlineNone),
    add_ovf = (0xD6, InlineNone),
    add_ovf_un = (0xD7, InlineNone),
    mul_ovf = (0xD8, InlineNone),
    mul_ovf_un = (0xD9, InlineNone),
    sub_ovf = (0xDA, InlineNone),
    sub_ovf_un = (0xDB, InlineNone),
    endfinally = (0xDC, InlineNone),
    leave = (0xDD, InlineBrTarget),
    leave_s = (0xDE, ShortInlineBrTarget),
    stind_i = (0xDF, InlineNone),
    conv_u = (0xE0, InlineNone),
    arglist = (0xFE00, InlineNone),
    ceq = (0xFE01, InlineNone),
    cgt = (0xFE02, InlineNone),
    cgt_un = (0xFE03, InlineNone),
    clt = (0xFE04, InlineNone),
    clt_un = (0xFE05, InlineNone),
    ldftn = (0xFE06, InlineMethod),
    ldvirtftn = (0xFE07, InlineMethod),
    ldarg = (0xFE09, InlineVar),
    ldarga = (0xFE0A, InlineVar),
    starg = (0xFE0B, InlineVar),
    ldloc = (0xFE0C, InlineVar),
    ldloca = (0xFE0D, InlineVar),
    stloc = (0xFE0E, InlineVar),
    localloc = (0xFE0F, InlineNone),
    endfilter = (0xFE11, InlineNone),
    unaligned = (0xFE12, ShortInlineI),
    volatile = (0xFE13, InlineNone),
    tail = (0xFE14, InlineNone),
    initobj = (0xFE15, InlineType),
    constrained = (0xFE16, InlineType),
    cpblk = (0xFE17, InlineNone),
    initblk = (0xFE18, InlineNone),
    rethrow = (0xFE1A, InlineNone),
    sizeof = (0xFE1C, InlineType),
    refanytype = (0xFE1D, InlineNone),
    readonly = (0xFE1E, InlineNone),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_opcodes() {
        assert_eq!(OpCode::nop.code(), 0x00);
        assert_eq!(OpCode::ret.code(), 0x2A);
        assert_eq!(OpCode::ldstr.code(), 0x72);
        assert_eq!(OpCode::nop.size(), 1);
    }

    #[test]
    fn test_prefixed_opcodes() {
        assert_eq!(OpCode::ldftn.code(), 0xFE06);
        assert_eq!(OpCode::ldftn.size(), 2);
        let mut writer = Writer::new();
        OpCode::ldftn.write(&mut writer);
        assert_eq!(writer.as_slice(), &[0xFE, 0x06]);
    }

    #[test]
    fn test_operand_kinds() {
        assert_eq!(OpCode::call.operand_kind(), OperandKind::InlineMethod);
        assert_eq!(OpCode::ldstr.operand_kind(), OperandKind::InlineString);
        assert_eq!(OpCode::br_s.operand_kind(), OperandKind::ShortInlineBrTarget);
        assert!(OpCode::ldtoken.operand_kind().is_token());
        assert!(!OpCode::ret.operand_kind().is_token());
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(OpCode::ldc_i4_s.mnemonic(), "ldc_i4_s");
        assert_eq!(OpCode::callvirt.mnemonic(), "callvirt");
    }
}

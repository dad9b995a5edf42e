//! CIL instructions and method body serialization.

mod body;
mod opcode;

pub use body::{
    ExceptionHandler, ExceptionHandlerKind, Instruction, MethodBody, MethodBodyBuffer, Operand,
    TokenProvider,
};
pub use opcode::{OpCode, OperandKind};

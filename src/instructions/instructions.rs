use std::fmt;
use std::fmt::Display;

use thiserror::Error;

pub(crate) type RegisterType = u8;

/// Identifies the producer of a not yet committed register value. A tag is the
/// index of the ROB slot of the producing instruction.
pub(crate) type Tag = u16;

pub(crate) const ARCH_REG_CNT: usize = 32;
pub(crate) const FU_CLASS_CNT: usize = 3;
pub(crate) const MAX_SOURCE_COUNT: usize = 2;

// the trace encoding for 'no register' and for the wildcard op_code.
pub(crate) const NO_REGISTER: i32 = -1;
pub(crate) const WILDCARD_OP_CODE: i32 = -1;

/// The class of functional unit an instruction executes on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub(crate) enum FuClass {
    K0,
    K1,
    K2,
}

impl FuClass {
    pub(crate) const ALL: [FuClass; FU_CLASS_CNT] = [FuClass::K0, FuClass::K1, FuClass::K2];

    pub(crate) fn index(self) -> usize {
        match self {
            FuClass::K0 => 0,
            FuClass::K1 => 1,
            FuClass::K2 => 2,
        }
    }
}

impl Display for FuClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.index())
    }
}

pub(crate) fn get_fu_class(op_code: i32) -> Option<FuClass> {
    match op_code {
        0 => Some(FuClass::K0),
        // the wildcard executes on a k1 unit.
        1 | WILDCARD_OP_CODE => Some(FuClass::K1),
        2 => Some(FuClass::K2),
        _ => None,
    }
}

pub(crate) fn get_register(value: i32) -> Result<Option<RegisterType>, DecodeError> {
    if value == NO_REGISTER {
        return Ok(None);
    }

    if value < 0 || value >= ARCH_REG_CNT as i32 {
        return Err(DecodeError::Register(value));
    }

    Ok(Some(value as RegisterType))
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum DecodeError {
    #[error("unknown op_code {0}, expected one of -1, 0, 1, 2")]
    OpCode(i32),
    #[error("register {0} out of range [-1, 31]")]
    Register(i32),
}

/// A decoded instruction from the trace. Immutable once decoded.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct Instr {
    pub(crate) addr: u32,
    pub(crate) op_code: i32,
    pub(crate) class: FuClass,
    pub(crate) sink: Option<RegisterType>,
    pub(crate) source: [Option<RegisterType>; MAX_SOURCE_COUNT],
}

impl Instr {
    pub(crate) fn decode(addr: u32, op_code: i32, sink: i32, source: [i32; MAX_SOURCE_COUNT]) -> Result<Instr, DecodeError> {
        let class = get_fu_class(op_code).ok_or(DecodeError::OpCode(op_code))?;

        Ok(Instr {
            addr,
            op_code,
            class,
            sink: get_register(sink)?,
            source: [get_register(source[0])?, get_register(source[1])?],
        })
    }
}

fn fmt_register(f: &mut fmt::Formatter<'_>, reg: Option<RegisterType>) -> fmt::Result {
    match reg {
        Some(reg) => write!(f, "r{}", reg),
        None => write!(f, "-"),
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} op{} ", self.addr, self.op_code)?;
        fmt_register(f, self.sink)?;
        for reg in self.source {
            write!(f, ", ")?;
            fmt_register(f, reg)?;
        }
        Ok(())
    }
}

/// The decoded trace.
pub(crate) struct Program {
    pub(crate) code: Vec<Instr>,
}

impl Program {
    pub(crate) fn new(code: Vec<Instr>) -> Program {
        Program { code }
    }

    pub(crate) fn len(&self) -> usize {
        self.code.len()
    }
}

/// Shorthand for building an instruction in tests; panics on invalid fields.
#[cfg(test)]
pub(crate) fn instr(op_code: i32, sink: i32, src0: i32, src1: i32) -> Instr {
    Instr::decode(0, op_code, sink, [src0, src1]).unwrap()
}

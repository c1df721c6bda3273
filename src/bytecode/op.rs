// =============================================================================
// OPCODE - Bytecode instruction catalogue
// =============================================================================

/// A single-byte instruction tag. The discriminants are part of the bytecode
/// format and must never be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // constants and stack
    Constant = 0,
    Pop,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // literals
    True,
    False,

    // comparison
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // logic
    And,
    Or,

    // prefix
    Minus,
    Bang,

    // control flow
    JumpNotTruthy,
    Jump,

    Nil,

    // globals
    SetGlobal,
    GetGlobal,

    // composites
    Array,
    Hash,
    SetIndex,
    GetIndex,

    // calls
    Call,
    ReturnValue,
    Return,

    // locals, builtins and closures
    SetLocal,
    GetLocal,
    GetBuiltin,
    Closure,
    GetFree,
    CurrentClosure,
}

/// Human readable name plus the byte width of every operand.
#[derive(Debug, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total number of operand bytes following the opcode byte.
    pub fn operand_bytes(&self) -> usize {
        self.operand_widths.iter().sum()
    }
}

const fn def(name: &'static str, operand_widths: &'static [usize]) -> Definition {
    Definition {
        name,
        operand_widths,
    }
}

static DEFINITIONS: [Definition; 34] = [
    def("CONSTANT", &[2]),
    def("POP", &[]),
    def("ADD", &[]),
    def("SUB", &[]),
    def("MUL", &[]),
    def("DIV", &[]),
    def("TRUE", &[]),
    def("FALSE", &[]),
    def("EQUAL", &[]),
    def("NOT_EQUAL", &[]),
    def("GREATER_THAN", &[]),
    def("GREATER_EQUAL", &[]),
    def("AND", &[]),
    def("OR", &[]),
    def("MINUS", &[]),
    def("BANG", &[]),
    def("JUMP_NOT_TRUTHY", &[2]),
    def("JUMP", &[2]),
    def("NIL", &[]),
    def("SET_GLOBAL", &[2]),
    def("GET_GLOBAL", &[2]),
    def("ARRAY", &[2]),
    def("HASH", &[2]),
    def("SET_INDEX", &[]),
    def("GET_INDEX", &[]),
    def("CALL", &[1]),
    def("RETURN_VALUE", &[]),
    def("RETURN", &[]),
    def("SET_LOCAL", &[1]),
    def("GET_LOCAL", &[1]),
    def("GET_BUILTIN", &[1]),
    def("CLOSURE", &[2, 1]),
    def("GET_FREE", &[1]),
    def("CURRENT_CLOSURE", &[]),
];

const OPCODES: [Opcode; 34] = [
    Opcode::Constant,
    Opcode::Pop,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::True,
    Opcode::False,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::GreaterThan,
    Opcode::GreaterThanOrEqual,
    Opcode::And,
    Opcode::Or,
    Opcode::Minus,
    Opcode::Bang,
    Opcode::JumpNotTruthy,
    Opcode::Jump,
    Opcode::Nil,
    Opcode::SetGlobal,
    Opcode::GetGlobal,
    Opcode::Array,
    Opcode::Hash,
    Opcode::SetIndex,
    Opcode::GetIndex,
    Opcode::Call,
    Opcode::ReturnValue,
    Opcode::Return,
    Opcode::SetLocal,
    Opcode::GetLocal,
    Opcode::GetBuiltin,
    Opcode::Closure,
    Opcode::GetFree,
    Opcode::CurrentClosure,
];

impl Opcode {
    pub fn definition(self) -> &'static Definition {
        &DEFINITIONS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OPCODES.get(byte as usize).copied().ok_or(byte)
    }
}

/// Looks up the definition of a raw opcode byte.
pub fn lookup(byte: u8) -> Option<&'static Definition> {
    Opcode::try_from(byte).ok().map(Opcode::definition)
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes one instruction. Operands are written big-endian using the widths
/// from the opcode's definition; values wider than their slot are truncated,
/// so callers that care check `fits_operand` first.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let definition = op.definition();
    let mut instruction = Vec::with_capacity(1 + definition.operand_bytes());
    instruction.push(op as u8);

    for (width, operand) in definition.operand_widths.iter().zip(operands) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => {}
        }
    }

    instruction
}

/// Whether `operand` can be stored in a slot of `width` bytes.
pub fn fits_operand(width: usize, operand: usize) -> bool {
    match width {
        1 => operand <= u8::MAX as usize,
        2 => operand <= u16::MAX as usize,
        _ => false,
    }
}

/// Decodes the operands that follow an opcode byte.
///
/// Returns the operands and the number of bytes consumed. `bytes` must start
/// right after the opcode and hold at least `definition.operand_bytes()` bytes.
pub fn read_operands(definition: &Definition, bytes: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(definition.operand_widths.len());
    let mut offset = 0;

    for width in definition.operand_widths {
        match width {
            2 => operands.push(read_u16(&bytes[offset..]) as usize),
            1 => operands.push(read_u8(&bytes[offset..]) as usize),
            _ => {}
        }
        offset += width;
    }

    (operands, offset)
}

pub fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

pub fn read_u8(bytes: &[u8]) -> u8 {
    bytes[0]
}

use crate::bytecode::ir::{Bytecode, Constant, Instructions};
use crate::bytecode::op::{Opcode, read_operands};
use std::fmt::{self, Write};

/// One decoded line of a disassembly listing.
enum Line {
    Instruction {
        offset: usize,
        opcode: Opcode,
        operands: Vec<usize>,
    },
    Undefined {
        offset: usize,
        byte: u8,
    },
    Truncated {
        offset: usize,
        opcode: Opcode,
    },
}

/// Walks an instruction stream. Undefined opcodes are reported and skipped
/// one byte at a time; a truncated operand list ends the walk.
fn decode(bytes: &[u8]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let byte = bytes[offset];
        let Ok(opcode) = Opcode::try_from(byte) else {
            lines.push(Line::Undefined { offset, byte });
            offset += 1;
            continue;
        };

        let definition = opcode.definition();
        if offset + 1 + definition.operand_bytes() > bytes.len() {
            lines.push(Line::Truncated { offset, opcode });
            break;
        }

        let (operands, read) = read_operands(definition, &bytes[offset + 1..]);
        lines.push(Line::Instruction {
            offset,
            opcode,
            operands,
        });
        offset += 1 + read;
    }

    lines
}

fn write_line(out: &mut impl Write, line: &Line) -> fmt::Result {
    match line {
        Line::Instruction {
            offset,
            opcode,
            operands,
        } => {
            write!(out, "{:04} {}", offset, opcode.name())?;
            for operand in operands {
                write!(out, " 0x{:X}", operand)?;
            }
            writeln!(out)
        }
        Line::Undefined { offset, byte } => {
            writeln!(out, "{:04} ERROR: opcode {} undefined", offset, byte)
        }
        Line::Truncated { offset, opcode } => {
            writeln!(out, "{:04} ERROR: truncated operands for {}", offset, opcode.name())
        }
    }
}

/// Renders one line per instruction: `<offset> <NAME> 0x<operand>...`.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in decode(self.as_bytes()) {
            write_line(f, &line)?;
        }
        Ok(())
    }
}

fn jump_targets(lines: &[Line]) -> Vec<usize> {
    let mut targets = Vec::new();

    for line in lines {
        if let Line::Instruction {
            opcode: Opcode::Jump | Opcode::JumpNotTruthy,
            operands,
            ..
        } = line
        {
            if !targets.contains(&operands[0]) {
                targets.push(operands[0]);
            }
        }
    }

    targets
}

fn format_constant(constant: &Constant) -> String {
    match constant {
        Constant::Integer(n) => format!("INTEGER     {}", n),
        Constant::Float(x) => format!("FLOAT       {}", x),
        Constant::String(s) => format!("STRING      {:?}", s),
        Constant::Function(function) => format!(
            "FUNCTION    params={} locals={}",
            function.num_parameters, function.num_locals
        ),
    }
}

fn write_code_object(out: &mut String, name: &str, instructions: &Instructions) -> fmt::Result {
    let lines = decode(instructions.as_bytes());
    let targets = jump_targets(&lines);

    writeln!(out, "════════════════════════════════════════")?;
    writeln!(out, " {}", name)?;
    writeln!(out, " {} bytes", instructions.len())?;
    writeln!(out, "════════════════════════════════════════")?;

    for line in &lines {
        let offset = match line {
            Line::Instruction { offset, .. }
            | Line::Undefined { offset, .. }
            | Line::Truncated { offset, .. } => *offset,
        };

        if targets.contains(&offset) {
            writeln!(out, "      ┌──────────────────────────────────")?;
            out.push_str("► ");
        } else {
            out.push_str("  ");
        }
        write_line(out, line)?;
    }

    writeln!(out)
}

/// Full listing of a program: the main stream, the constant pool, and the
/// body of every compiled function in the pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_listing(&mut out, bytecode);
    out
}

fn write_listing(out: &mut String, bytecode: &Bytecode) -> fmt::Result {
    writeln!(out, "=== BYTECODE PROGRAM ===\n")?;
    write_code_object(out, "main", &bytecode.instructions)?;

    if !bytecode.constants.is_empty() {
        writeln!(out, "constants:")?;
        for (i, constant) in bytecode.constants.iter().enumerate() {
            writeln!(out, "  [{:04}] {}", i, format_constant(constant))?;
        }
        writeln!(out)?;
    }

    for (i, constant) in bytecode.constants.iter().enumerate() {
        if let Constant::Function(function) = constant {
            write_code_object(out, &format!("fn[{}]", i), &function.instructions)?;
        }
    }

    Ok(())
}

/// Print disassembly of a bytecode program
pub fn print_bytecode(bytecode: &Bytecode) {
    print!("{}", disassemble_bytecode(bytecode));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::CompiledFunction;
    use crate::bytecode::op::make;
    use indoc::indoc;
    use std::rc::Rc;

    fn concat(parts: Vec<Vec<u8>>) -> Instructions {
        parts.into_iter().collect()
    }

    #[test]
    fn test_instructions_string() {
        let instructions = concat(vec![
            make(Opcode::Add, &[]),
            make(Opcode::GetLocal, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[65535]),
            make(Opcode::Closure, &[65535, 255]),
        ]);

        let expected = indoc! {"
            0000 ADD
            0001 GET_LOCAL 0x1
            0003 CONSTANT 0x2
            0006 CONSTANT 0xFFFF
            0009 CLOSURE 0xFFFF 0xFF
        "};

        assert_eq!(instructions.to_string(), expected);
    }

    #[test]
    fn test_undefined_opcode_does_not_stop_listing() {
        let mut bytes = vec![250];
        bytes.extend(make(Opcode::Pop, &[]));

        let expected = indoc! {"
            0000 ERROR: opcode 250 undefined
            0001 POP
        "};

        assert_eq!(Instructions::from(bytes).to_string(), expected);
    }

    #[test]
    fn test_truncated_operands_are_reported() {
        let bytes = vec![Opcode::Constant as u8, 0];
        assert_eq!(
            Instructions::from(bytes).to_string(),
            "0000 ERROR: truncated operands for CONSTANT\n"
        );
    }

    #[test]
    fn test_listing_includes_functions_and_jump_targets() {
        let function = CompiledFunction {
            instructions: concat(vec![make(Opcode::Nil, &[]), make(Opcode::ReturnValue, &[])]),
            num_locals: 0,
            num_parameters: 0,
        };
        let bytecode = Bytecode {
            instructions: concat(vec![
                make(Opcode::True, &[]),
                make(Opcode::JumpNotTruthy, &[4]),
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::Pop, &[]),
            ]),
            constants: vec![Constant::Function(Rc::new(function))],
        };

        let listing = disassemble_bytecode(&bytecode);
        assert!(listing.contains(" main"));
        assert!(listing.contains(" fn[0]"));
        assert!(listing.contains("FUNCTION    params=0 locals=0"));
        assert!(listing.contains("► 0004 CLOSURE 0x0 0x0"));
        assert!(listing.contains("  0000 NIL"));
    }
}

use std::fmt::Write;

use crate::bytecode::ir::{CodeObject, DecodeError};
use crate::bytecode::op::{Instruction, Opcode, OpcodeTable};

/// Print disassembly of a code object
pub fn print_code(code: &CodeObject, table: &OpcodeTable) -> Result<(), DecodeError> {
    println!("════════════════════════════════════════");
    println!(" {} ({})", code.name(), code.filename());
    println!(" {} bytes, stacksize {}", code.code().len(), code.stacksize());
    println!("════════════════════════════════════════");
    print!("{}", disassemble(code, table)?);
    println!();
    Ok(())
}

/// Return disassembly as a String, one instruction per line:
///
/// ```text
///   0 LOAD_CONST               0 (2)
///   3 LOAD_CONST               1 (3)
///   6 BINARY_ADD
/// ```
pub fn disassemble(code: &CodeObject, table: &OpcodeTable) -> Result<String, DecodeError> {
    let mut output = String::new();

    for (offset, instr) in code.instructions(table)? {
        output.push_str(&format_instruction(code, offset, &instr));
        output.push('\n');
    }

    Ok(output)
}

fn format_instruction(code: &CodeObject, offset: usize, instr: &Instruction) -> String {
    let Some(arg) = instr.operand() else {
        return format!("{:>4} {}", offset, instr.opcode());
    };

    let resolved = match instr.opcode() {
        Opcode::LoadConst => code.consts().get(usize::from(arg)).map(ToString::to_string),
        Opcode::LoadGlobal | Opcode::StoreGlobal => code.names().get(usize::from(arg)).cloned(),
        Opcode::CallFunction => Some(format!("{} positional", arg)),
        _ => None,
    };

    match resolved {
        Some(text) => format!("{:>4} {:<24} {:>3} ({})", offset, instr.opcode(), arg, text),
        // index past the end of its pool
        None => format!("{:>4} {:<24} {:>3} (<invalid>)", offset, instr.opcode(), arg),
    }
}

/// Render the metadata block and pools.
pub fn format_code_info(code: &CodeObject) -> String {
    let mut out = String::new();

    // write! into a String cannot fail
    let _ = writeln!(out, "Name:              {}", code.name());
    let _ = writeln!(out, "Filename:          {}", code.filename());
    let _ = writeln!(out, "Argument count:    {}", code.argcount());
    let _ = writeln!(out, "Kw-only arguments: {}", code.kwonlyargcount());
    let _ = writeln!(out, "Number of locals:  {}", code.nlocals());
    let _ = writeln!(out, "Stack size:        {}", code.stacksize());
    let _ = writeln!(
        out,
        "Flags:             {:#x} {:?}",
        code.flags().bits(),
        code.flags()
    );
    let _ = writeln!(out, "First line:        {}", code.firstlineno());

    let _ = writeln!(out, "Constants:");
    for (i, c) in code.consts().iter().enumerate() {
        let _ = writeln!(out, "  {:>3}: {}", i, c);
    }

    if !code.names().is_empty() {
        let _ = writeln!(out, "Names:");
        for (i, n) in code.names().iter().enumerate() {
            let _ = writeln!(out, "  {:>3}: {}", i, n);
        }
    }

    out
}

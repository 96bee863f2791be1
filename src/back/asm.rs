//! Translates Three-Address Code into x86-64 AT&T assembly (spec.md §4.3).
//!
//! Grounded directly on `original_source/src/asm.c`'s instruction-form
//! helpers (`asm_instr_*`, `asm_binary_op`, `asm_any_to_reg`,
//! `asm_reg_to_any`, `asm_arithmetic`, `asm_program_arguments`) — this
//! module keeps the same small set of legal MOV/CMP shapes and the same
//! entry-point trampoline, but walks `tac::Function` directly instead of
//! re-lexing a text buffer, since the TAC is already a typed value here.

use std::fmt::Write as _;

use crate::common::{Id, Map, Platform};
use crate::error::{CompileError, Result};
use crate::front::ast::BinOp;
use crate::middle::tac;

/// `tmp0..tmp7` map onto these eight general-purpose registers in order
/// (spec.md §3.4, §4.3.1).
const GP_REGISTERS: [&str; 8] = ["%rax", "%rbx", "%r10", "%r11", "%r12", "%r13", "%r14", "%r15"];

fn tmp_register(k: u32) -> Result<&'static str> {
    GP_REGISTERS
        .get(k as usize)
        .copied()
        .ok_or_else(|| CompileError::resource(format!("temporary tmp{k} exceeds the 8 general-purpose registers")))
}

fn jump_mnemonic(cond: BinOp) -> &'static str {
    match cond {
        BinOp::Lt => "jl",
        BinOp::Lte => "jle",
        BinOp::Gt => "jg",
        BinOp::Gte => "jge",
        BinOp::Eq => "je",
        BinOp::Neq => "jne",
        _ => panic!("jump_mnemonic called on a non-comparison operator"),
    }
}

fn arith_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Plus => "addq",
        BinOp::Minus => "subq",
        BinOp::Mult => "mulq",
        BinOp::Div => "divq",
        _ => panic!("arith_mnemonic called on a non-arithmetic operator"),
    }
}

/// Per-function local-name -> stack-offset table, built up as `LoadArg`/
/// `DeclLocal` instructions are walked (mirrors `asm_sym_t` in the
/// original, but keyed directly off the offsets TAC already carries).
type Locals = Map<Id, u64>;

fn lookup_offset(locals: &Locals, name: Id) -> Result<u64> {
    locals
        .get(&name)
        .copied()
        .ok_or_else(|| CompileError::resource(format!("assignment to '{name}' before its declaration")))
}

/// `asm_binary_op`: dispatch on whether the first operand is an
/// immediate or a temporary register, and whether the destination is a
/// stack slot or another temporary register. Used for both `ASSIGN`
/// (mnemonic `movq`) and `COMPARE` (mnemonic `cmpq`) — they differ only
/// in the opcode, not the operand-form rules.
fn emit_binary_op(out: &mut String, op: &str, src: tac::Operand, dst_name: Option<Id>, dst_tmp: Option<u32>, locals: &Locals) -> Result<()> {
    let dst = if let Some(name) = dst_name {
        format!("-{}(%rbp)", lookup_offset(locals, name)?)
    } else {
        tmp_register(dst_tmp.expect("either dst_name or dst_tmp must be set"))?.to_string()
    };

    match src {
        tac::Operand::Imm(val) => {
            writeln!(out, "\t{op}\t${val}, {dst}").unwrap();
        }
        tac::Operand::Tmp(t) => {
            let reg = tmp_register(t)?;
            if reg != dst.as_str() {
                writeln!(out, "\t{op}\t{reg}, {dst}").unwrap();
            }
        }
        tac::Operand::Name(_) => {
            unreachable!("the lowering pass never leaves a bare name as a first operand")
        }
    }
    Ok(())
}

/// `asm_any_to_reg`: move any operand form into a fixed destination
/// register, used by `tmpX = ...` lowering and by CALL/PARAM wiring.
fn emit_any_to_reg(out: &mut String, op: &str, src: tac::Operand, dst_reg: &str, locals: &Locals) -> Result<()> {
    match src {
        tac::Operand::Imm(val) => {
            writeln!(out, "\t{op}\t${val}, {dst_reg}").unwrap();
        }
        tac::Operand::Name(name) => {
            let off = lookup_offset(locals, name)?;
            writeln!(out, "\t{op}\t-{off}(%rbp), {dst_reg}").unwrap();
        }
        tac::Operand::Tmp(t) => {
            let reg = tmp_register(t)?;
            if reg != dst_reg {
                writeln!(out, "\t{op}\t{reg}, {dst_reg}").unwrap();
            }
        }
    }
    Ok(())
}

/// `asm_reg_to_any`: move a fixed source register into any operand form
/// (used to land a CALL's result where it belongs).
fn emit_reg_to_any(out: &mut String, op: &str, src_reg: &str, dst: tac::Operand, locals: &Locals) -> Result<()> {
    match dst {
        tac::Operand::Name(name) => {
            let off = lookup_offset(locals, name)?;
            writeln!(out, "\t{op}\t{src_reg}, -{off}(%rbp)").unwrap();
        }
        tac::Operand::Tmp(t) => {
            let reg = tmp_register(t)?;
            if reg != src_reg {
                writeln!(out, "\t{op}\t{src_reg}, {reg}").unwrap();
            }
        }
        tac::Operand::Imm(_) => unreachable!("CALL never targets an immediate"),
    }
    Ok(())
}

fn emit_function(out: &mut String, func: &tac::Function, platform: Platform) -> Result<()> {
    let is_entry = func.name.as_str() == "main";
    let label = if is_entry { "real_main" } else { func.name.as_str() };
    writeln!(out, "{label}:").unwrap();
    writeln!(out, "\tpushq\t%rbp").unwrap();
    writeln!(out, "\tmovq\t%rsp, %rbp").unwrap();

    let call_regs = platform.call_registers();
    let mut locals: Locals = Locals::new();
    let mut arg_count = 0usize;
    let mut param_count = 0usize;

    for instr in &func.instructions {
        match instr {
            tac::Instruction::FunctionLabel(_) => {}
            tac::Instruction::InternalLabel(k) => {
                writeln!(out, ".L{k}:").unwrap();
            }
            tac::Instruction::AddStack(n) => {
                writeln!(out, "\tsubq\t${n}, %rsp").unwrap();
            }
            tac::Instruction::DeclLocal { offset, name } => {
                locals.insert(*name, *offset);
            }
            tac::Instruction::LoadArg { offset, name } => {
                if arg_count >= call_regs.len() {
                    return Err(CompileError::resource(format!(
                        "function '{}' takes more arguments than {} registers can carry",
                        func.name,
                        call_regs.len()
                    )));
                }
                writeln!(out, "\tmovq\t{}, -{offset}(%rbp)", call_regs[arg_count]).unwrap();
                locals.insert(*name, *offset);
                arg_count += 1;
            }
            tac::Instruction::Assign { src, dst } => {
                emit_binary_op(out, "movq", *src, Some(*dst), None, &locals)?;
            }
            tac::Instruction::Compare { a, b } => match b {
                tac::Operand::Name(name) => emit_binary_op(out, "cmpq", *a, Some(*name), None, &locals)?,
                tac::Operand::Tmp(t) => emit_binary_op(out, "cmpq", *a, None, Some(*t), &locals)?,
                tac::Operand::Imm(_) => unreachable!("an immediate can never be COMPARE's second operand"),
            },
            tac::Instruction::Jump(target) => {
                writeln!(out, "\tjmp\t.L{target}").unwrap();
            }
            tac::Instruction::JumpIf { cond, target } => {
                writeln!(out, "\t{}\t.L{target}", jump_mnemonic(*cond)).unwrap();
            }
            tac::Instruction::Param(op) => {
                if param_count >= call_regs.len() {
                    return Err(CompileError::resource(format!(
                        "call passes more arguments than {} registers can carry",
                        call_regs.len()
                    )));
                }
                emit_any_to_reg(out, "movq", *op, call_regs[param_count], &locals)?;
                param_count += 1;
            }
            tac::Instruction::Call { name, dst } => {
                param_count = 0;
                writeln!(out, "\tcall\t{name}").unwrap();
                if let Some(dst) = dst {
                    emit_reg_to_any(out, "movq", "%rax", *dst, &locals)?;
                }
            }
            tac::Instruction::Return(value) => {
                if let Some(value) = value {
                    emit_any_to_reg(out, "movq", *value, "%rax", &locals)?;
                }
                writeln!(out, "\tleave").unwrap();
                writeln!(out, "\tret").unwrap();
            }
            tac::Instruction::TmpMove { dst, src } => {
                let reg = tmp_register(*dst)?;
                emit_any_to_reg(out, "movq", *src, reg, &locals)?;
            }
            tac::Instruction::TmpBinary { dst, op, a, b } => {
                let reg = tmp_register(*dst)?;
                emit_any_to_reg(out, "movq", *a, reg, &locals)?;
                emit_any_to_reg(out, arith_mnemonic(*op), *b, reg, &locals)?;
            }
        }
    }
    Ok(())
}

/// Synthesizes the real `main` symbol: it converts the process's `argv`
/// strings into integers with `strtol@PLT`, calls the user's `main`
/// (renamed `real_main`) with them loaded into the calling-convention
/// registers, then prints the result with `printf@PLT` (spec.md §4.3.4).
fn emit_entry_trampoline(out: &mut String, platform: Platform, argc: usize) -> Result<()> {
    let call_regs = platform.call_registers();
    if argc > call_regs.len() {
        return Err(CompileError::resource(format!(
            "main takes more arguments than {} registers can carry",
            call_regs.len()
        )));
    }

    writeln!(out, ".LC0:").unwrap();
    writeln!(out, "\t.string \"%d\\n\"").unwrap();
    writeln!(out, "main:").unwrap();
    writeln!(out, "\tpushq\t%rbp").unwrap();
    writeln!(out, "\tmovq\t%rsp, %rbp").unwrap();
    writeln!(out, "\tsubq\t${}, %rsp", (argc + 3) * 8).unwrap();

    writeln!(out, "\tmovq\t{}, -8(%rbp)", call_regs[0]).unwrap();
    writeln!(out, "\tmovq\t{}, -16(%rbp)", call_regs[1]).unwrap();

    for i in 0..argc {
        writeln!(out, "\tmovq\t-16(%rbp), %rax").unwrap();
        writeln!(out, "\taddq\t${}, %rax", 8 * (i + 1)).unwrap();
        writeln!(out, "\tmovq\t(%rax), %rax").unwrap();
        writeln!(out, "\tmovq\t$10, {}", call_regs[2]).unwrap();
        writeln!(out, "\tmovq\t$0, {}", call_regs[1]).unwrap();
        writeln!(out, "\tmovq\t%rax, {}", call_regs[0]).unwrap();
        writeln!(out, "\tcall\tstrtol@PLT").unwrap();
        writeln!(out, "\tmovq\t%rax, -{}(%rbp)", (i + 3) * 8).unwrap();
    }
    for i in 0..argc {
        writeln!(out, "\tmovq\t-{}(%rbp), {}", (i + 3) * 8, call_regs[i]).unwrap();
    }

    writeln!(out, "\tcall\treal_main").unwrap();
    writeln!(out, "\tmovq\t%rax, {}", call_regs[1]).unwrap();
    writeln!(out, "\tleaq\t.LC0(%rip), {}", call_regs[0]).unwrap();
    writeln!(out, "\tcall\tprintf@PLT").unwrap();
    writeln!(out, "\tleave").unwrap();
    writeln!(out, "\tret").unwrap();
    Ok(())
}

/// Emit a whole program as one assembly-file body. The parser already
/// guarantees exactly one `main` function exists, so this never has to
/// invent one.
pub fn emit_program(program: &tac::Program, platform: Platform) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "\t.globl\tmain").unwrap();

    let mut main_argc = 0usize;
    for func in &program.functions {
        if func.name.as_str() == "main" {
            main_argc =
                func.instructions.iter().filter(|i| matches!(i, tac::Instruction::LoadArg { .. })).count();
        }
        emit_function(&mut out, func, platform)?;
    }

    emit_entry_trampoline(&mut out, platform, main_argc)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse;
    use crate::middle::lower_program;

    fn assemble(src: &str) -> String {
        let program = parse(src).unwrap();
        let tac = lower_program(&program);
        emit_program(&tac, Platform::Sysv).unwrap()
    }

    #[test]
    fn entry_point_is_renamed_and_a_trampoline_main_is_synthesized() {
        let asm = assemble("fonction main(entier a): entier { retourner a; }");
        assert!(asm.contains("real_main:"));
        assert!(asm.contains("call\tstrtol@PLT"));
        assert!(asm.contains("call\tprintf@PLT"));
        assert!(asm.contains(".globl\tmain"));
    }

    #[test]
    fn a_temp_is_never_moved_into_itself() {
        let asm = assemble("fonction main(entier a): entier { retourner a + 1; }");
        assert!(!asm.contains("movq\t%rax, %rax"));
    }

    #[test]
    fn comparisons_never_place_a_stack_operand_first() {
        let asm = assemble(
            "fonction main(entier a): entier { si (a < 5) retourner 1; sinon retourner 0; }",
        );
        for line in asm.lines() {
            if let Some(rest) = line.trim().strip_prefix("cmpq\t") {
                let first = rest.split(',').next().unwrap();
                assert!(!first.contains("(%rbp)"), "cmpq first operand was a stack slot: {line}");
            }
        }
    }

    #[test]
    fn resource_error_when_a_ninth_temporary_would_be_needed() {
        // Hand-built TAC exercising the register-exhaustion guard
        // directly; real lowering never produces a 9th live temporary.
        let mut instructions = vec![tac::Instruction::FunctionLabel(crate::common::intern("main"))];
        for k in 0..9u32 {
            instructions.push(tac::Instruction::TmpMove { dst: k, src: tac::Operand::Imm(k as i64) });
        }
        let program = tac::Program {
            functions: vec![tac::Function { name: crate::common::intern("main"), instructions }],
        };
        let err = emit_program(&program, Platform::Sysv).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Resource);
    }
}

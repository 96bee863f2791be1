//! Three-Address Code: the linear IR described in spec.md §3.3, the
//! lowering pass from `front::ast` (§4.2), and the textual pretty-printer
//! that produces the `.interm` file contract.
//!
//! Grounded on `original_source/src/tac.c`: the label/temporary counters,
//! the FIFO temp-reuse queue and the short-circuit condition lowering
//! are a direct translation of `tac_new_tmp`/`tac_release_tmp`/
//! `tac_condition`, re-expressed over owned Rust data instead of a
//! global mutable table and `malloc`'d strings.

use std::collections::VecDeque;
use std::fmt;

use crate::common::Id;
use crate::front::ast::{self, BinOp, Expr, Stmt};

/// One TAC value: an immediate, a virtual register, or a local/param
/// name (always resolved against the enclosing function table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Imm(i64),
    Tmp(u32),
    Name(Id),
}

impl Operand {
    pub fn is_memory(self) -> bool {
        matches!(self, Operand::Name(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(n) => write!(f, "${n}"),
            Operand::Tmp(k) => write!(f, "tmp{k}"),
            Operand::Name(name) => write!(f, "{name}"),
        }
    }
}

/// One TAC instruction (spec.md §3.3). `FunctionLabel` only ever appears
/// as the first instruction of a `Function`; every other label used for
/// control flow is `InternalLabel`.
#[derive(Debug, Clone)]
pub enum Instruction {
    FunctionLabel(Id),
    InternalLabel(u32),
    AddStack(u64),
    LoadArg { offset: u64, name: Id },
    DeclLocal { offset: u64, name: Id },
    Assign { src: Operand, dst: Id },
    Compare { a: Operand, b: Operand },
    Jump(u32),
    JumpIf { cond: BinOp, target: u32 },
    Param(Operand),
    Call { name: Id, dst: Option<Operand> },
    Return(Option<Operand>),
    TmpMove { dst: u32, src: Operand },
    TmpBinary { dst: u32, op: BinOp, a: Operand, b: Operand },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::FunctionLabel(name) => write!(f, "{name}:"),
            Instruction::InternalLabel(k) => write!(f, "L{k}:"),
            Instruction::AddStack(n) => write!(f, "\tADD_STACK ${n}"),
            Instruction::LoadArg { offset, name } => write!(f, "\tLOAD_ARG ${offset} {name}"),
            Instruction::DeclLocal { offset, name } => write!(f, "\tDECL_LOCAL ${offset} {name}"),
            Instruction::Assign { src, dst } => write!(f, "\tASSIGN {src} {dst}"),
            Instruction::Compare { a, b } => write!(f, "\tCOMPARE {a} {b}"),
            Instruction::Jump(l) => write!(f, "\tJUMP L{l}"),
            Instruction::JumpIf { cond, target } => {
                write!(f, "\tJUMP_{} L{target}", cond.cond_name())
            }
            Instruction::Param(op) => write!(f, "\tPARAM {op}"),
            Instruction::Call { name, dst: Some(dst) } => write!(f, "\tCALL {name} {dst}"),
            Instruction::Call { name, dst: None } => write!(f, "\tCALL {name}"),
            Instruction::Return(Some(op)) => write!(f, "\tRETURN {op}"),
            Instruction::Return(None) => write!(f, "\tRETURN"),
            Instruction::TmpMove { dst, src } => write!(f, "\ttmp{dst} = {src}"),
            Instruction::TmpBinary { dst, op, a, b } => {
                write!(f, "\ttmp{dst} = {a} {} {b}", op.symbol())
            }
        }
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: Id,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            for instr in &func.instructions {
                writeln!(f, "{instr}")?;
            }
        }
        Ok(())
    }
}

/// Lower a whole, already type-checked program. Declaration order between
/// functions is preserved (spec.md §5 "Ordering guarantees").
pub fn lower_program(program: &ast::Program) -> Program {
    Program {
        functions: program.functions.iter().map(lower_function).collect(),
    }
}

/// Whether a binary-op node is a comparison leaf for the purposes of
/// condition lowering (spec.md §4.2.5) — everything that is not itself
/// `ET`/`OU`.
fn is_comparison_leaf(expr: &Expr) -> bool {
    match expr {
        Expr::Paren(inner) => is_comparison_leaf(inner),
        Expr::Binary { op, .. } => op.is_comparison(),
        _ => false,
    }
}

/// The enclosing boolean context threaded through condition lowering;
/// see spec.md §4.2.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolCtx {
    And,
    Or,
}

struct Lowerer {
    next_tmp: u32,
    next_label: u32,
    released: VecDeque<u32>,
    instructions: Vec<Instruction>,
}

impl Lowerer {
    fn new() -> Self {
        Lowerer { next_tmp: 0, next_label: 0, released: VecDeque::new(), instructions: Vec::new() }
    }

    fn emit(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// Dequeue a released temporary before minting a new one (spec.md §3.4).
    fn new_tmp(&mut self) -> u32 {
        self.released.pop_front().unwrap_or_else(|| {
            let t = self.next_tmp;
            self.next_tmp += 1;
            t
        })
    }

    fn new_label(&mut self) -> u32 {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    /// Release a result once its consumer is done with it. A variable
    /// name or an immediate is simply discarded (spec.md §4.2.2).
    fn release(&mut self, op: Operand) {
        if let Operand::Tmp(t) = op {
            self.released.push_back(t);
        }
    }

    // -- expressions ---------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Integer(v) => Operand::Imm(*v),
            Expr::Variable(v) => Operand::Name(v.name),
            Expr::Paren(inner) => self.lower_expr(inner),
            Expr::Binary { op, left, right } => {
                let a = self.lower_expr(left);
                let b = self.lower_expr(right);
                let dst = self.new_tmp();
                self.emit(Instruction::TmpBinary { dst, op: *op, a, b });
                self.release(a);
                self.release(b);
                Operand::Tmp(dst)
            }
            Expr::FnCall { name, args } => {
                let arg_ops: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();
                for &a in &arg_ops {
                    self.emit(Instruction::Param(a));
                }
                let dst = self.new_tmp();
                self.emit(Instruction::Call { name: *name, dst: Some(Operand::Tmp(dst)) });
                for a in arg_ops {
                    self.release(a);
                }
                Operand::Tmp(dst)
            }
        }
    }

    /// Lower an rvalue destined for `ASSIGN`. `ASSIGN`'s destination is
    /// always a stack/local name, so its source may never itself be a
    /// bare memory name — that would be the "stack → stack" move the
    /// assembler cannot produce (spec.md §4.3.3). A plain variable
    /// reference is therefore forced through a temporary first.
    fn lower_rvalue_for_assign(&mut self, expr: &Expr) -> Operand {
        let v = self.lower_expr(expr);
        match v {
            Operand::Name(_) => {
                let t = self.new_tmp();
                self.emit(Instruction::TmpMove { dst: t, src: v });
                Operand::Tmp(t)
            }
            other => other,
        }
    }

    // -- comparisons -----------------------------------------------------

    /// §4.2.6: emit `COMPARE` respecting the two-operand-form rules. When
    /// the operands trade places to satisfy them, the returned comparison
    /// is negated rather than mirrored (`a < b` reordered to `cmpq b, a`
    /// is tested with `>=`); `==`/`!=` are left as-is either way.
    fn lower_comparison(&mut self, op: BinOp, left: &Expr, right: &Expr) -> BinOp {
        let a = self.lower_expr(left);
        let b = self.lower_expr(right);

        let op = if !a.is_memory() {
            if let Operand::Imm(_) = b {
                let t = self.new_tmp();
                self.emit(Instruction::TmpMove { dst: t, src: b });
                self.emit(Instruction::Compare { a, b: Operand::Tmp(t) });
                self.release(Operand::Tmp(t));
            } else {
                self.emit(Instruction::Compare { a, b });
            }
            op
        } else if !b.is_memory() {
            self.emit(Instruction::Compare { a: b, b: a });
            if matches!(op, BinOp::Eq | BinOp::Neq) {
                op
            } else {
                op.inverse_comparison()
            }
        } else {
            let t = self.new_tmp();
            self.emit(Instruction::TmpMove { dst: t, src: a });
            self.emit(Instruction::Compare { a: Operand::Tmp(t), b });
            self.release(Operand::Tmp(t));
            op
        };

        self.release(a);
        self.release(b);
        op
    }

    // -- conditions (short-circuit, jump threading) -----------------------

    /// §4.2.5. Exactly one of `l_true`/`l_false` is `None`, meaning
    /// "fall through" (spec.md's `JumpTarget::FallThrough`, §9).
    fn lower_condition(&mut self, expr: &Expr, l_true: Option<u32>, l_false: Option<u32>, parent: BoolCtx) {
        match expr {
            Expr::Paren(inner) => self.lower_condition(inner, l_true, l_false, parent),
            Expr::Binary { op, left, right } if op.is_comparison() => {
                let comp = self.lower_comparison(*op, left, right);
                match l_false {
                    Some(lf) => self.emit(Instruction::JumpIf { cond: comp.inverse_comparison(), target: lf }),
                    None => {
                        let lt = l_true.expect("exactly one of l_true/l_false must be set");
                        self.emit(Instruction::JumpIf { cond: comp, target: lt });
                    }
                }
            }
            Expr::Binary { op: BinOp::And, left, right } => {
                let between = self.new_label();
                if is_comparison_leaf(left) {
                    self.lower_condition(left, None, l_false, BoolCtx::And);
                } else {
                    self.lower_condition(left, Some(between), l_false, BoolCtx::And);
                }
                self.emit(Instruction::InternalLabel(between));
                if is_comparison_leaf(right) {
                    self.lower_condition(right, None, l_false, BoolCtx::And);
                } else {
                    self.lower_condition(right, l_true, l_false, BoolCtx::And);
                }
            }
            Expr::Binary { op: BinOp::Or, left, right } => {
                let between = self.new_label();
                if is_comparison_leaf(left) {
                    self.lower_condition(left, l_true, None, BoolCtx::Or);
                } else {
                    self.lower_condition(left, l_true, Some(between), BoolCtx::Or);
                }
                self.emit(Instruction::InternalLabel(between));
                if is_comparison_leaf(right) {
                    if parent == BoolCtx::Or {
                        self.lower_condition(right, l_true, None, BoolCtx::Or);
                    } else {
                        self.lower_condition(right, None, l_false, BoolCtx::Or);
                    }
                } else {
                    self.lower_condition(right, l_true, l_false, BoolCtx::Or);
                }
            }
            _ => unreachable!("parser only builds Boolean conditions from comparisons and ET/OU"),
        }
    }

    // -- statements --------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declaration { rvalue: None, .. } => {}
            Stmt::Declaration { lvalue, rvalue: Some(rvalue) } => {
                let src = self.lower_rvalue_for_assign(rvalue);
                self.emit(Instruction::Assign { src, dst: lvalue.name });
                self.release(src);
            }
            Stmt::Assignment { lvalue, rvalue } => {
                let src = self.lower_rvalue_for_assign(rvalue);
                self.emit(Instruction::Assign { src, dst: lvalue.name });
                self.release(src);
            }
            Stmt::Expr(expr) => {
                let result = self.lower_expr(expr);
                self.release(result);
            }
            Stmt::Return(None) => self.emit(Instruction::Return(None)),
            Stmt::Return(Some(expr)) => {
                let t = self.lower_expr(expr);
                self.emit(Instruction::Return(Some(t)));
                self.release(t);
            }
            Stmt::Compound(stmts) => {
                for s in stmts {
                    self.lower_stmt(s);
                }
            }
            Stmt::Branch { condition, valid, invalid } => {
                self.lower_branch(condition, valid, invalid);
            }
            Stmt::Loop { condition, body } => self.lower_loop(condition, body),
        }
    }

    /// §4.2.3. Walks the `sinon si (...)` chain, which is represented as
    /// nested `Branch`es in `invalid`.
    fn lower_branch(&mut self, condition: &Expr, valid: &Stmt, invalid: &Option<Box<Stmt>>) {
        let label_after = self.new_label();
        let mut condition = condition;
        let mut valid = valid;
        let mut invalid = invalid;

        loop {
            let label_true = self.new_label();
            let label_false = if invalid.is_some() { self.new_label() } else { label_after };

            self.lower_condition(condition, Some(label_true), Some(label_false), BoolCtx::And);
            self.emit(Instruction::InternalLabel(label_true));
            self.lower_stmt(valid);

            match invalid {
                None => break,
                Some(next) => {
                    self.emit(Instruction::Jump(label_after));
                    self.emit(Instruction::InternalLabel(label_false));
                    match next.as_ref() {
                        Stmt::Branch { condition: c, valid: v, invalid: i } => {
                            condition = c;
                            valid = v;
                            invalid = i;
                        }
                        other => {
                            self.lower_stmt(other);
                            break;
                        }
                    }
                }
            }
        }
        self.emit(Instruction::InternalLabel(label_after));
    }

    /// §4.2.4.
    fn lower_loop(&mut self, condition: &Expr, body: &Stmt) {
        let label_start = self.new_label();
        let label_true = self.new_label();
        let label_false = self.new_label();

        self.emit(Instruction::InternalLabel(label_start));
        self.lower_condition(condition, Some(label_true), Some(label_false), BoolCtx::And);
        self.emit(Instruction::InternalLabel(label_true));
        self.lower_stmt(body);
        self.emit(Instruction::Jump(label_start));
        self.emit(Instruction::InternalLabel(label_false));
    }
}

fn lower_function(func: &ast::Function) -> Function {
    let mut lw = Lowerer::new();
    lw.emit(Instruction::FunctionLabel(func.name));

    // §4.2 step 2: assign each symbol's frame offset in declaration
    // order, then emit ADD_STACK, then the LOAD_ARG/DECL_LOCAL lines.
    let n = func.table.len() as u64;
    let mut prelude = Vec::with_capacity(func.table.len());
    for (i, sym) in func.table.iter().enumerate() {
        let offset = 8 + 8 * i as u64;
        sym.set_rel_pos(offset);
        prelude.push(match sym.kind {
            crate::front::symbol::SymbolKind::Param => {
                Instruction::LoadArg { offset, name: sym.name }
            }
            crate::front::symbol::SymbolKind::Var => {
                Instruction::DeclLocal { offset, name: sym.name }
            }
        });
    }
    lw.emit(Instruction::AddStack(8 * (n + 1)));
    lw.instructions.extend(prelude);

    for stmt in &func.body {
        lw.lower_stmt(stmt);
    }

    Function { name: func.name, instructions: lw.instructions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse;

    fn lower(src: &str) -> Program {
        lower_program(&parse(src).unwrap())
    }

    #[test]
    fn add_stack_and_load_arg_precede_the_body() {
        let tac = lower("fonction main(entier a): entier { retourner a; }");
        let instrs = &tac.functions[0].instructions;
        assert!(matches!(instrs[0], Instruction::FunctionLabel(_)));
        assert!(matches!(instrs[1], Instruction::AddStack(16)));
        assert!(matches!(instrs[2], Instruction::LoadArg { offset: 8, .. }));
    }

    #[test]
    fn arithmetic_precedence_lowers_mult_before_add() {
        let tac = lower("fonction main(): entier { retourner 1 + 2 * 3; }");
        let text = tac.to_string();
        // 2 * 3 must be computed (and temp-reused) before the addition.
        assert!(text.contains("* $3"));
        assert!(text.contains("$1 +"));
    }

    #[test]
    fn compare_never_has_a_bare_memory_operand_on_the_left_unless_swapped() {
        // `a < 5`: a is memory, 5 is immediate -> swapped form `COMPARE $5 a`
        // with the comparator inverted.
        let tac =
            lower("fonction main(entier a): entier { si (a < 5) retourner 1; retourner 0; }");
        let text = tac.to_string();
        assert!(text.contains("COMPARE $5 a"));
        assert!(text.contains("JUMP_LT") || text.contains("JUMP_GTE") || text.contains("JUMP_LTE") || text.contains("JUMP_GT"));
    }

    #[test]
    fn temporary_reuse_keeps_the_peak_index_small() {
        // Three independent additions in sequence should each reuse tmp0,
        // not keep allocating new indices, because each result is
        // consumed (and released) before the next one is computed.
        let tac = lower(
            "fonction main(entier a): entier { \
               entier x = a + 1; \
               entier y = a + 2; \
               entier z = a + 3; \
               retourner z; \
             }",
        );
        let text = tac.to_string();
        assert!(!text.contains("tmp1"));
        assert!(text.contains("tmp0"));
    }

    #[test]
    fn short_circuit_and_does_not_compare_the_right_leaf_when_left_fails() {
        // si (a < b ET b < c): for the structure, the left leaf's false
        // jump must go straight to the branch's L_false (no intervening
        // compare of b < c on that path) — checked here by shape: the
        // AND's "between" label sits strictly between the two COMPAREs.
        let tac = lower(
            "fonction main(entier a, entier b, entier c): entier { \
               si (a < b ET b < c) retourner 1; sinon retourner 0; \
             }",
        );
        let instrs = &tac.functions[0].instructions;
        let compares: Vec<usize> =
            instrs.iter().enumerate().filter(|(_, i)| matches!(i, Instruction::Compare { .. })).map(|(i, _)| i).collect();
        assert_eq!(compares.len(), 2);
        let jumps_between: Vec<_> = instrs[compares[0]..compares[1]]
            .iter()
            .filter(|i| matches!(i, Instruction::JumpIf { .. }))
            .collect();
        assert_eq!(jumps_between.len(), 1, "left leaf must emit exactly one conditional jump before the second COMPARE");
    }

    #[test]
    fn bare_variable_initializer_is_routed_through_a_temporary() {
        // entier y = x; must never produce `ASSIGN x y` (stack -> stack).
        let tac =
            lower("fonction main(entier x): entier { entier y = x; retourner y; }");
        let text = tac.to_string();
        assert!(!text.contains("ASSIGN x y"));
        assert!(text.contains("tmp0 = x"));
        assert!(text.contains("ASSIGN tmp0 y"));
    }

    #[test]
    fn call_arguments_are_lowered_in_source_order() {
        let tac = lower(
            "fonction f(entier a, entier b): entier { retourner a; } \
             fonction main(): entier { retourner f(1, 2); }",
        );
        let text = tac.to_string();
        let p1 = text.find("PARAM $1").unwrap();
        let p2 = text.find("PARAM $2").unwrap();
        assert!(p1 < p2);
    }
}

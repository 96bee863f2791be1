//! The abstract syntax tree.

use std::fmt;

use crate::common::Id;
use crate::front::symbol::{FunctionTable, SymbolKind};

/// The source language only has these three types; `Boolean` never
/// appears in source syntax (there is no `booleen` keyword) but every
/// comparison and `ET`/`OU` expression produces one, and conditions are
/// checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Integer,
    Void,
    Boolean,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarType::Integer => "entier",
            VarType::Void => "rien",
            VarType::Boolean => "booleen",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Mult,
    Div,
    And,
    Or,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

impl BinOp {
    /// Precedence ladder from §4.1.1, lowest-binds-last.
    pub fn priority(self) -> i32 {
        use BinOp::*;
        match self {
            And | Or => 10,
            Lt | Lte | Gt | Gte | Eq | Neq => 20,
            Plus | Minus => 30,
            Mult | Div => 40,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Plus | BinOp::Minus | BinOp::Mult | BinOp::Div)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte | BinOp::Eq | BinOp::Neq
        )
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// The operator one would use to jump on the *opposite* outcome of a
    /// comparison; used for `sinon` jump threading and, for everything but
    /// `==`/`!=`, for the COMPARE operand-reorder rule in §4.2.6 (reordering
    /// which value is which operand of `cmpq` also flips which side of the
    /// test each flag corresponds to).
    pub fn inverse_comparison(self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Gte,
            BinOp::Lte => BinOp::Gt,
            BinOp::Gt => BinOp::Lte,
            BinOp::Gte => BinOp::Lt,
            BinOp::Eq => BinOp::Neq,
            BinOp::Neq => BinOp::Eq,
            _ => panic!("inverse_comparison called on a non-comparison operator"),
        }
    }

    /// The symbolic spelling used in TAC (`tmp0 = a + b`) and in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Mult => "*",
            BinOp::Div => "/",
            BinOp::And => "ET",
            BinOp::Or => "OU",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
        }
    }

    /// The `JUMP_<cond>`/`COMPARE` cond name used in TAC text (§3.3).
    pub fn cond_name(self) -> &'static str {
        match self {
            BinOp::Lt => "LT",
            BinOp::Lte => "LTE",
            BinOp::Gt => "GT",
            BinOp::Gte => "GTE",
            BinOp::Eq => "EQ",
            BinOp::Neq => "NEQ",
            _ => panic!("cond_name called on a non-comparison operator"),
        }
    }
}

/// A variable occurrence: either a declaration site or a use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: Id,
    pub ty: VarType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Integer(i64),
    Variable(Variable),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    /// A parenthesized sub-expression. The only unary form the grammar has.
    Paren(Box<Expr>),
    FnCall { name: Id, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Declaration { lvalue: Variable, rvalue: Option<Expr> },
    Assignment { lvalue: Variable, rvalue: Expr },
    /// A bare expression statement, e.g. a call used for its side effects.
    Expr(Expr),
    Return(Option<Expr>),
    Branch { condition: Expr, valid: Box<Stmt>, invalid: Option<Box<Stmt>> },
    Loop { condition: Expr, body: Box<Stmt> },
    Compound(Vec<Stmt>),
}

#[derive(Debug)]
pub struct Function {
    pub name: Id,
    pub return_type: VarType,
    pub params: Vec<Variable>,
    pub body: Vec<Stmt>,
    /// The function's own symbol table (params, then locals, in
    /// declaration order). Stack offsets (`rel_pos`) start unset and are
    /// filled in by the TAC lowering pass (§4.2 step 2).
    pub table: FunctionTable,
}

#[derive(Debug)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            print_function(f, function)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn print_function(f: &mut fmt::Formatter<'_>, func: &Function) -> fmt::Result {
    writeln!(f, "fonction {}: {}", func.name, func.return_type)?;
    for sym in func.table.iter() {
        let marker = match sym.kind {
            SymbolKind::Param => '*',
            SymbolKind::Var => '-',
        };
        writeln!(f, "   {marker} {}: {} ({})", sym.name, sym.ty, sym.kind)?;
    }
    for stmt in &func.body {
        print_stmt(f, stmt, 3)?;
    }
    Ok(())
}

fn indent(f: &mut fmt::Formatter<'_>, n: usize) -> fmt::Result {
    write!(f, "{:n$}", "", n = n)
}

fn print_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, ind: usize) -> fmt::Result {
    indent(f, ind)?;
    match stmt {
        Stmt::Declaration { lvalue, rvalue } => {
            write!(f, "{}: {}", lvalue.name, lvalue.ty)?;
            if let Some(expr) = rvalue {
                write!(f, " = ")?;
                print_expr(f, expr)?;
            }
            writeln!(f, ";")
        }
        Stmt::Assignment { lvalue, rvalue } => {
            write!(f, "{} = ", lvalue.name)?;
            print_expr(f, rvalue)?;
            writeln!(f, ";")
        }
        Stmt::Expr(expr) => {
            print_expr(f, expr)?;
            writeln!(f, ";")
        }
        Stmt::Return(expr) => {
            write!(f, "retourner")?;
            if let Some(expr) = expr {
                write!(f, " ")?;
                print_expr(f, expr)?;
            }
            writeln!(f, ";")
        }
        Stmt::Branch { condition, valid, invalid } => {
            write!(f, "si (")?;
            print_expr(f, condition)?;
            writeln!(f, ")")?;
            print_stmt(f, valid, ind + 2)?;
            if let Some(invalid) = invalid {
                indent(f, ind)?;
                writeln!(f, "sinon")?;
                print_stmt(f, invalid, ind + 2)?;
            }
            Ok(())
        }
        Stmt::Loop { condition, body } => {
            write!(f, "tantque (")?;
            print_expr(f, condition)?;
            writeln!(f, ")")?;
            print_stmt(f, body, ind + 2)
        }
        Stmt::Compound(stmts) => {
            writeln!(f, "{{")?;
            for s in stmts {
                print_stmt(f, s, ind + 2)?;
            }
            indent(f, ind)?;
            writeln!(f, "}}")
        }
    }
}

fn print_expr(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Integer(v) => write!(f, "{v}"),
        Expr::Variable(v) => write!(f, "{}", v.name),
        Expr::Paren(inner) => {
            write!(f, "(")?;
            print_expr(f, inner)?;
            write!(f, ")")
        }
        Expr::Binary { op, left, right } => {
            print_expr(f, left)?;
            write!(f, " {} ", op.symbol())?;
            print_expr(f, right)
        }
        Expr::FnCall { name, args } => {
            write!(f, "{name}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                print_expr(f, arg)?;
            }
            write!(f, ")")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;

    #[test]
    fn precedence_tree_shape() {
        // a + b * c  =>  Binary(+, a, Binary(*, b, c))
        let a = Expr::Variable(Variable { name: intern("a"), ty: VarType::Integer });
        let b = Expr::Variable(Variable { name: intern("b"), ty: VarType::Integer });
        let c = Expr::Variable(Variable { name: intern("c"), ty: VarType::Integer });
        let tree = Expr::Binary {
            op: BinOp::Plus,
            left: Box::new(a),
            right: Box::new(Expr::Binary { op: BinOp::Mult, left: Box::new(b), right: Box::new(c) }),
        };
        match tree {
            Expr::Binary { op: BinOp::Plus, right, .. } => match *right {
                Expr::Binary { op: BinOp::Mult, .. } => {}
                _ => panic!("expected nested Mult on the right"),
            },
            _ => panic!("expected Plus at the root"),
        }
    }

    #[test]
    fn display_roundtrips_a_simple_function() {
        let func = Function {
            name: intern("f"),
            return_type: VarType::Integer,
            params: vec![Variable { name: intern("x"), ty: VarType::Integer }],
            body: vec![Stmt::Return(Some(Expr::Variable(Variable {
                name: intern("x"),
                ty: VarType::Integer,
            })))],
            table: FunctionTable::new(),
        };
        let program = Program { functions: vec![func] };
        let text = program.to_string();
        assert!(text.contains("fonction f: entier"));
        assert!(text.contains("retourner x;"));
    }
}

// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::Ident;

// we use Boxes here because we may walk ASTs a number of times, and we
// want to avoid copying and reallocating subexpressions all over the place.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64),
    Var(Ident),
    /// A function application; the callee may be a builtin or a lookup
    /// variable applied to an argument.
    App(Ident, Vec<Expr>),
    /// A subscripted variable reference; the Vensim grammar only produces
    /// symbol lists inside brackets, so arguments are names, not expressions.
    Subscript(Ident, Vec<Ident>),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const("0.0".to_string(), 0.0)
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

struct PrintVisitor {}

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(s, _) => s.clone(),
            Expr::Var(id) => id.clone(),
            Expr::App(func, args) => {
                let args: Vec<String> = args.iter().map(|e| self.walk(e)).collect();
                format!("{}({})", func, args.join(", "))
            }
            Expr::Subscript(id, args) => {
                format!("{}[{}]", id, args.join(","))
            }
            Expr::Op1(op, l) => {
                let l = self.walk(l);
                let op: &str = match op {
                    UnaryOp::Positive => "+",
                    UnaryOp::Negative => "-",
                    UnaryOp::Not => ":NOT:",
                };
                format!("{}{}", op, l)
            }
            Expr::Op2(op, l, r) => {
                let l = self.walk(l);
                let r = self.walk(r);
                let op: &str = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Exp => "^",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "%",
                    BinaryOp::Gt => ">",
                    BinaryOp::Lt => "<",
                    BinaryOp::Gte => ">=",
                    BinaryOp::Lte => "<=",
                    BinaryOp::Eq => "=",
                    BinaryOp::Neq => "<>",
                    BinaryOp::And => ":AND:",
                    BinaryOp::Or => ":OR:",
                };
                format!("({} {} {})", l, op, r)
            }
            Expr::If(cond, t, f) => {
                let cond = self.walk(cond);
                let t = self.walk(t);
                let f = self.walk(f);
                format!("IF THEN ELSE({}, {}, {})", cond, t, f)
            }
        }
    }
}

/// Render an expression back to Vensim-flavored source text, for the
/// `modelFormula` diagnostics field.
pub fn print_eqn(expr: &Expr) -> String {
    let mut visitor = PrintVisitor {};
    visitor.walk(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_eqn() {
        assert_eq!(
            "(_a + _b)",
            print_eqn(&Expr::Op2(
                BinaryOp::Add,
                Box::new(Expr::Var("_a".to_string())),
                Box::new(Expr::Var("_b".to_string()))
            ))
        );
        assert_eq!(
            "-_a",
            print_eqn(&Expr::Op1(
                UnaryOp::Negative,
                Box::new(Expr::Var("_a".to_string()))
            ))
        );
        assert_eq!("4.7", print_eqn(&Expr::Const("4.7".to_string(), 4.7)));
        assert_eq!(
            "_g[_r1]",
            print_eqn(&Expr::Subscript(
                "_g".to_string(),
                vec!["_r1".to_string()]
            ))
        );
        assert_eq!(
            "_table(1.0)",
            print_eqn(&Expr::App(
                "_table".to_string(),
                vec![Expr::Const("1.0".to_string(), 1.0)]
            ))
        );
    }
}

// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! RHS analysis: walk each variable's right-hand side, record the
//! variables it references (split into evaluation-time and init-time
//! lists), and infer the record's semantic type.

use crate::ast::{Expr, Visitor};
use crate::builtins::{is_builtin_fn, is_level_fn};
use crate::common::{canonicalize, Result};
use crate::datamodel::Rhs;
use crate::model_err;
use crate::spec::{DirectData, Spec};
use crate::subscript::SubscriptTable;
use crate::variable::{Reference, Variable, VariableTable, VarType};

/// Classify every record and populate its raw reference lists. Runs
/// once, after the variable reader and before the analyzer passes.
pub fn analyze_equations(
    variables: &mut VariableTable,
    subscripts: &SubscriptTable,
    spec: &Spec,
    direct_data: &DirectData,
) -> Result<()> {
    for var in variables.iter_mut() {
        if var.var_type == VarType::Unspecified {
            continue; // the _time placeholder
        }
        analyze_one(var, subscripts, spec, direct_data)?;
    }
    Ok(())
}

fn analyze_one(
    var: &mut Variable,
    subscripts: &SubscriptTable,
    spec: &Spec,
    direct_data: &DirectData,
) -> Result<()> {
    let eqn = var.eqn.clone();
    match &eqn {
        Rhs::Lookup(points) => {
            check_lookup_points(&var.model_lhs, points)?;
            var.var_type = VarType::Lookup;
        }
        Rhs::Data => {
            var.var_type = VarType::Data;
        }
        Rhs::DirectData(tag) => {
            if !spec.is_direct_data_tag(tag) {
                return model_err!(
                    DoesNotExist,
                    format!("direct data tag '{}' for {}", tag, var.model_lhs)
                );
            }
            var.var_type = VarType::Data;
            if var.points.is_none() {
                var.points = direct_data.get(tag).cloned();
            }
        }
        Rhs::WithLookup(input, points) => {
            check_lookup_points(&var.model_lhs, points)?;
            var.var_type = VarType::Aux;
            let mut walker = RefWalker::new(subscripts);
            walker.walk(input);
            walker.store(var);
        }
        Rhs::Expr(expr) => classify_expr(var, expr, subscripts)?,
    }
    Ok(())
}

/// A lookup table needs at least one point, with x values ascending, or
/// interpolation over it is meaningless.
fn check_lookup_points(lhs: &str, points: &[(f64, f64)]) -> Result<()> {
    if points.is_empty() {
        return model_err!(BadLookupTable, format!("{} has no points", lhs));
    }
    for pair in points.windows(2) {
        if pair[0].0 >= pair[1].0 {
            return model_err!(
                BadLookupTable,
                format!("{} x values are not ascending", lhs)
            );
        }
    }
    Ok(())
}

fn classify_expr(var: &mut Variable, expr: &Expr, subscripts: &SubscriptTable) -> Result<()> {
    if let Expr::App(func, args) = expr {
        let func = canonicalize(func);
        if is_level_fn(&func) {
            return classify_level(var, &func, args, subscripts);
        }
        if func == "_initial" {
            if args.len() != 1 {
                return model_err!(
                    Generic,
                    format!("INITIAL expects 1 argument in {}", var.model_lhs)
                );
            }
            var.var_type = VarType::Initial;
            var.has_init_value = true;
            let mut walker = RefWalker::new(subscripts);
            walker.in_initial = true;
            walker.walk(&args[0]);
            walker.store(var);
            return Ok(());
        }
    }

    let mut walker = RefWalker::new(subscripts);
    walker.walk(expr);
    let is_const = walker.references.is_empty() && walker.init_references.is_empty();
    walker.store(var);
    var.var_type = if is_const { VarType::Const } else { VarType::Aux };
    Ok(())
}

/// The level primitives: `INTEG(flow, init)` and the delay/smooth family.
/// Value arguments feed `references`; the initial-value argument (or the
/// input, when the form has no explicit one) feeds `initReferences`.
fn classify_level(
    var: &mut Variable,
    func: &str,
    args: &[Expr],
    subscripts: &SubscriptTable,
) -> Result<()> {
    let expected_arity = match func {
        "_integ" => 2,
        "_delay_fixed" => 3,
        "_delay1" | "_delay3" | "_smooth" | "_smooth3" => 2,
        "_delay1i" | "_delay3i" | "_smoothi" | "_smooth3i" => 3,
        _ => unreachable!("not a level fn: {}", func),
    };
    if args.len() != expected_arity {
        return model_err!(
            Generic,
            format!(
                "{} expects {} arguments in {}",
                func, expected_arity, var.model_lhs
            )
        );
    }

    var.var_type = VarType::Level;
    var.has_init_value = true;

    let mut walker = RefWalker::new(subscripts);
    let (eval_args, init_arg): (&[Expr], &Expr) = match func {
        // INTEG(flow, init)
        "_integ" => (&args[..1], &args[1]),
        // DELAY FIXED(input, delay, init) and the *I forms
        "_delay_fixed" | "_delay1i" | "_delay3i" | "_smoothi" | "_smooth3i" => {
            (&args[..2], &args[2])
        }
        // input doubles as the initial value
        _ => (&args[..2], &args[0]),
    };
    for arg in eval_args {
        walker.walk(arg);
    }
    walker.in_initial = true;
    walker.walk(init_arg);
    walker.store(var);
    Ok(())
}

/// Collects references from an expression tree. Dimension and index
/// names are not references; anything seen inside `INITIAL(...)`
/// contributes only to the init-time list.
struct RefWalker<'a> {
    subscripts: &'a SubscriptTable,
    references: Vec<Reference>,
    init_references: Vec<Reference>,
    in_initial: bool,
}

impl<'a> RefWalker<'a> {
    fn new(subscripts: &'a SubscriptTable) -> RefWalker<'a> {
        RefWalker {
            subscripts,
            references: Vec::new(),
            init_references: Vec::new(),
            in_initial: false,
        }
    }

    fn push(&mut self, reference: Reference) {
        let list = if self.in_initial {
            &mut self.init_references
        } else {
            &mut self.references
        };
        if !list.contains(&reference) {
            list.push(reference);
        }
    }

    fn store(self, var: &mut Variable) {
        var.raw_references.extend(self.references);
        var.raw_init_references.extend(self.init_references);
    }
}

impl<'a> Visitor<()> for RefWalker<'a> {
    fn walk(&mut self, e: &Expr) {
        match e {
            Expr::Const(_, _) => {}
            Expr::Var(id) => {
                let id = canonicalize(id);
                if !self.subscripts.is_subscript(&id) {
                    self.push(Reference::bare(&id));
                }
            }
            Expr::Subscript(id, subs) => {
                let subs: Vec<_> = subs.iter().map(|s| canonicalize(s)).collect();
                self.push(Reference {
                    name: canonicalize(id),
                    subscripts: self.subscripts.normalize_subscripts(&subs),
                });
            }
            Expr::App(func, args) => {
                let func = canonicalize(func);
                if func == "_initial" {
                    let was_initial = self.in_initial;
                    self.in_initial = true;
                    for arg in args.iter() {
                        self.walk(arg);
                    }
                    self.in_initial = was_initial;
                    return;
                }
                if !is_builtin_fn(&func) {
                    // a lookup variable applied to an argument
                    self.push(Reference::bare(&func));
                }
                for arg in args.iter() {
                    self.walk(arg);
                }
            }
            Expr::Op1(_, l) => self.walk(l),
            Expr::Op2(_, l, r) => {
                self.walk(l);
                self.walk(r);
            }
            Expr::If(cond, t, f) => {
                self.walk(cond);
                self.walk(t);
                self.walk(f);
            }
        }
    }
}

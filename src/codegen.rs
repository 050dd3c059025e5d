// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The C emitter: given an analyzed model and its evaluation orderings,
//! produce a single translation unit whose execution reproduces the
//! model's semantics. All numeric storage is IEEE-754 double; arrays
//! are sized by subscript family and laid out row-major in family
//! order, so apply-to-all and separated records share storage.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::analyze::Analysis;
use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{c_helper, c_level_helper, is_level_fn};
use crate::common::{canonicalize, Ident, RefId, Result, TIME_VAR};
use crate::datamodel::Rhs;
use crate::model_err;
use crate::sort::{aux_ordering, init_ordering, level_ordering, topo_sort};
use crate::spec::{parse_spec_var, Spec};
use crate::variable::{Variable, VarType};

/// The declarations the generated translation unit links against. The
/// helper implementations live in the runtime shipped alongside the
/// compiler; callers materialize this next to the generated C.
pub const RUNTIME_HEADER: &str = r#"#ifndef SDE_RUNTIME_H
#define SDE_RUNTIME_H

#include <math.h>
#include <stddef.h>

typedef struct {
  size_t n;
  double *data; /* n (x, y) pairs, x ascending */
} Lookup;

Lookup *__new_lookup(size_t n, const double *data);
double _LOOKUP(Lookup *table, double x);
double _WITH_LOOKUP(double x, Lookup *table);

double _ABS(double a);
double _ARCCOS(double a);
double _ARCSIN(double a);
double _ARCTAN(double a);
double _COS(double a);
double _EXP(double a);
double _IF_THEN_ELSE(double c, double t, double f);
double _INTEGER(double a);
double _LN(double a);
double _MAX(double a, double b);
double _MIN(double a, double b);
double _MODULO(double a, double b);
double _RANDOM_UNIFORM(double low, double high, double seed);
double _SIN(double a);
double _SQRT(double a);
double _TAN(double a);

double _DELAY_FIXED(size_t slot, double input, double delay_time, double init, double dt);
double _DELAY1(size_t slot, double input, double delay_time, double init, double dt);
double _DELAY3(size_t slot, double input, double delay_time, double init, double dt);
double _SMOOTH(size_t slot, double input, double smooth_time, double init, double dt);
double _SMOOTH3(size_t slot, double input, double smooth_time, double init, double dt);
void __reset_state(void);

void __output_reset(void);
void __output_begin_row(double time);
void __output(double value);
size_t __output_rows(void);
size_t __output_cols(void);
const double *__output_data(void);

#endif
"#;

const LOOP_VARS: [&str; 5] = ["i", "j", "k", "l", "m"];

/// Emit the complete C translation unit for an analyzed model.
pub fn generate(analysis: &Analysis, spec: &Spec, model_name: &str) -> Result<String> {
    let generator = Generator::new(analysis, spec)?;
    generator.generate(model_name)
}

struct Generator<'a> {
    analysis: &'a Analysis,
    spec: &'a Spec,
    aux_order: Vec<RefId>,
    level_order: Vec<RefId>,
    init_order: Vec<RefId>,
    /// Per-record state-slot bases for the delay/smooth helpers.
    slot_bases: BTreeMap<RefId, usize>,
    /// Per-record lookup-table cell names for WITH LOOKUP equations.
    with_lookup_tables: BTreeMap<RefId, String>,
}

impl<'a> Generator<'a> {
    fn new(analysis: &'a Analysis, spec: &'a Spec) -> Result<Generator<'a>> {
        let variables = &analysis.variables;
        let mut slot_bases = BTreeMap::new();
        let mut next_slot = 0usize;
        let mut with_lookup_tables = BTreeMap::new();
        let mut table_counts: BTreeMap<Ident, usize> = BTreeMap::new();

        for var in variables.iter() {
            if var.var_type == VarType::Level && level_helper_of(var).is_some() {
                slot_bases.insert(var.ref_id.clone(), next_slot);
                next_slot += element_count(analysis, var)?;
            }
            if var.var_type != VarType::Data && matches!(var.eqn, Rhs::WithLookup(_, _)) {
                let n = table_counts.entry(var.var_name.clone()).or_insert(0);
                with_lookup_tables.insert(var.ref_id.clone(), format!("__t{}_{}", var.var_name, n));
                *n += 1;
            }
        }

        Ok(Generator {
            analysis,
            spec,
            aux_order: aux_ordering(variables)?,
            level_order: level_ordering(variables)?,
            init_order: init_ordering(variables)?,
            slot_bases,
            with_lookup_tables,
        })
    }

    fn generate(&self, model_name: &str) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "// {}.c", model_name);
        let _ = writeln!(out, "// generated by vensim2c; do not edit");
        let _ = writeln!(out);
        let _ = writeln!(out, "#include \"sde_runtime.h\"");
        let _ = writeln!(out);

        out.push_str(&self.declarations()?);
        out.push_str(&self.index_tables());
        out.push_str(&self.init_constants()?);
        out.push_str(&self.init_lookups()?);
        out.push_str(&self.init_levels()?);
        out.push_str(&self.eval_aux()?);
        out.push_str(&self.eval_levels()?);
        out.push_str(&self.store_outputs()?);
        out.push_str(&self.set_inputs()?);
        out.push_str(&self.run_model()?);
        Ok(out)
    }

    fn groups(&self) -> BTreeMap<Ident, Vec<&Variable>> {
        let mut groups: BTreeMap<Ident, Vec<&Variable>> = BTreeMap::new();
        for var in self.analysis.variables.iter() {
            groups.entry(var.var_name.clone()).or_default().push(var);
        }
        groups
    }

    fn declarations(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "double _time;");
        let groups = self.groups();
        for (name, records) in groups.iter() {
            if name == TIME_VAR {
                continue;
            }
            let rep = records[0];
            if matches!(rep.var_type, VarType::Lookup | VarType::Data) {
                if !rep.subscripts.is_empty() || records.len() > 1 {
                    return model_err!(
                        Generic,
                        format!("subscripted lookup {} is not supported", name)
                    );
                }
                let _ = writeln!(out, "Lookup *{};", name);
                continue;
            }
            let mut decl = format!("double {}", name);
            for size in self.family_sizes(rep)? {
                let _ = write!(decl, "[{}]", size);
            }
            let _ = writeln!(out, "{};", decl);
        }
        for table in self.with_lookup_tables.values() {
            let _ = writeln!(out, "static Lookup *{};", table);
        }
        let _ = writeln!(out);
        Ok(out)
    }

    /// Storage extents: one per subscript position, sized by family.
    fn family_sizes(&self, var: &Variable) -> Result<Vec<usize>> {
        let families = self.analysis.subscripts.subscript_families(&var.subscripts)?;
        families
            .iter()
            .map(|f| self.analysis.subscripts.family_size(f))
            .collect()
    }

    /// Position tables for subrange dimensions and inverted mappings.
    fn index_tables(&self) -> String {
        let mut out = String::new();
        for dim in self.analysis.subscripts.dimensions() {
            let (name, value, family, mappings) = match dim {
                crate::subscript::Subscript::Dimension {
                    name,
                    value,
                    family,
                    mappings,
                } => (name, value, family, mappings),
                _ => unreachable!(),
            };
            if name != family {
                let positions = self.positions_of(value);
                let _ = writeln!(
                    out,
                    "static const size_t __idx{}[{}] = {{ {} }};",
                    name,
                    positions.len(),
                    positions.join(", ")
                );
            }
            for (to, value) in mappings.iter() {
                let positions = self.positions_of(value);
                let _ = writeln!(
                    out,
                    "static const size_t __map{}{}[{}] = {{ {} }};",
                    name,
                    to,
                    positions.len(),
                    positions.join(", ")
                );
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn positions_of(&self, indices: &[Ident]) -> Vec<String> {
        indices
            .iter()
            .map(|i| {
                self.analysis
                    .subscripts
                    .index_position(i)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    fn init_constants(&self) -> Result<String> {
        let consts: Vec<&Variable> = self
            .analysis
            .variables
            .iter()
            .filter(|v| v.var_type == VarType::Const)
            .collect();

        // consts may reference consts, so order assignments by their raw
        // dependencies before emission
        let nodes: Vec<RefId> = consts.iter().map(|v| v.ref_id.clone()).collect();
        let mut edges: Vec<(RefId, RefId)> = Vec::new();
        for v in consts.iter() {
            for r in v.raw_references.iter().chain(v.raw_init_references.iter()) {
                for i in self.analysis.variables.records_named(&r.name) {
                    let target = self.analysis.variables.get(i);
                    if target.var_type == VarType::Const && target.ref_id != v.ref_id {
                        edges.push((v.ref_id.clone(), target.ref_id.clone()));
                    }
                }
            }
        }
        let order = topo_sort(&nodes, &edges)?;

        let mut out = String::new();
        let _ = writeln!(out, "void initConstants(void) {{");
        for ref_id in order.iter() {
            let var = self.analysis.variables.get_by_ref_id(ref_id).unwrap();
            out.push_str(&self.record_assignment(var, false)?);
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    fn init_lookups(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "void initLookups(void) {{");
        let groups = self.groups();
        for (name, records) in groups.iter() {
            let rep = records[0];
            if !matches!(rep.var_type, VarType::Lookup | VarType::Data) {
                continue;
            }
            let points = match &rep.points {
                Some(points) => points,
                None => {
                    return model_err!(
                        DoesNotExist,
                        format!("no data series for {}", name)
                    );
                }
            };
            let _ = writeln!(out, "  {} = {};", name, new_lookup(points));
        }
        for (ref_id, table) in self.with_lookup_tables.iter() {
            let var = self.analysis.variables.get_by_ref_id(ref_id).unwrap();
            let points = var.points.as_ref().expect("WITH LOOKUP carries points");
            let _ = writeln!(out, "  {} = {};", table, new_lookup(points));
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    fn init_levels(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "void initLevels(void) {{");
        for ref_id in self.init_order.iter() {
            let var = self.analysis.variables.get_by_ref_id(ref_id).unwrap();
            out.push_str(&self.record_assignment(var, true)?);
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    fn eval_aux(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "void evalAux(void) {{");
        for ref_id in self.aux_order.iter() {
            let var = self.analysis.variables.get_by_ref_id(ref_id).unwrap();
            out.push_str(&self.record_assignment(var, false)?);
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    /// Level updates are two-phase: every INTEG rate is computed into a
    /// temporary first, then integrated, so each level reads the
    /// previous step of every other level regardless of update order.
    fn eval_levels(&self) -> Result<String> {
        let mut decls = String::new();
        let mut rates = String::new();
        let mut applies = String::new();
        let mut next_rate = 0usize;

        for ref_id in self.level_order.iter() {
            let var = self.analysis.variables.get_by_ref_id(ref_id).unwrap();
            if let Rhs::Expr(Expr::App(func, args)) = &var.eqn {
                if canonicalize(func) == "_integ" {
                    let rate_name = format!("__rate{}", next_rate);
                    next_rate += 1;
                    let mut decl = format!("  double {}", rate_name);
                    for size in self.family_sizes(var)? {
                        let _ = write!(decl, "[{}]", size);
                    }
                    let _ = writeln!(decls, "{};", decl);
                    let (rate, apply) = self.integ_blocks(var, &rate_name, &args[0])?;
                    rates.push_str(&rate);
                    applies.push_str(&apply);
                    continue;
                }
            }
            applies.push_str(&self.record_assignment(var, false)?);
        }

        let mut out = String::new();
        let _ = writeln!(out, "void evalLevels(void) {{");
        out.push_str(&decls);
        out.push_str(&rates);
        out.push_str(&applies);
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    fn integ_blocks(
        &self,
        var: &Variable,
        rate_name: &str,
        flow: &Expr,
    ) -> Result<(String, String)> {
        let (loops, ctx, lhs) = self.open_loops(var)?;
        let rate_lhs = format!("{}{}", rate_name, &lhs[var.var_name.len()..]);
        let indent = "  ".repeat(ctx.depth + 1);

        let mut rate = String::new();
        let mut apply = String::new();
        for (depth, line) in loops.iter().enumerate() {
            let _ = writeln!(rate, "{}{}", "  ".repeat(depth + 1), line);
            let _ = writeln!(apply, "{}{}", "  ".repeat(depth + 1), line);
        }
        let _ = writeln!(
            rate,
            "{}{} = {};",
            indent,
            rate_lhs,
            self.emit_expr(flow, &ctx)?
        );
        let _ = writeln!(apply, "{}{} += _time_step * {};", indent, lhs, rate_lhs);
        for depth in (0..loops.len()).rev() {
            let _ = writeln!(rate, "{}}}", "  ".repeat(depth + 1));
            let _ = writeln!(apply, "{}}}", "  ".repeat(depth + 1));
        }
        Ok((rate, apply))
    }

    /// One record's assignment, wrapped in loops over its dimension
    /// subscripts. `init` selects the init-time form for levels and
    /// INITIAL equations.
    fn record_assignment(&self, var: &Variable, init: bool) -> Result<String> {
        let (loops, ctx, lhs) = self.open_loops(var)?;
        let indent = "  ".repeat(ctx.depth + 1);

        let statement = match &var.eqn {
            Rhs::WithLookup(input, _) => {
                let table = &self.with_lookup_tables[&var.ref_id];
                format!(
                    "{} = _WITH_LOOKUP({}, {});",
                    lhs,
                    self.emit_expr(input, &ctx)?,
                    table
                )
            }
            Rhs::Expr(Expr::App(func, args)) if is_level_fn(&canonicalize(func)) => {
                self.level_statement(var, &canonicalize(func), args, init, &lhs, &ctx)?
            }
            Rhs::Expr(Expr::App(func, args)) if canonicalize(func) == "_initial" => {
                format!("{} = {};", lhs, self.emit_expr(&args[0], &ctx)?)
            }
            Rhs::Expr(expr) => format!("{} = {};", lhs, self.emit_expr(expr, &ctx)?),
            _ => {
                return model_err!(
                    Generic,
                    format!("{} has no evaluatable equation", var.ref_id)
                );
            }
        };

        let mut out = String::new();
        for (depth, line) in loops.iter().enumerate() {
            let _ = writeln!(out, "{}{}", "  ".repeat(depth + 1), line);
        }
        let _ = writeln!(out, "{}{}", indent, statement);
        for depth in (0..loops.len()).rev() {
            let _ = writeln!(out, "{}}}", "  ".repeat(depth + 1));
        }
        Ok(out)
    }

    fn level_statement(
        &self,
        var: &Variable,
        func: &str,
        args: &[Expr],
        init: bool,
        lhs: &str,
        ctx: &LoopCtx,
    ) -> Result<String> {
        if func == "_integ" {
            if !init {
                // step-time integration is emitted two-phase in evalLevels
                return model_err!(Generic, format!("{}: stray INTEG emission", var.ref_id));
            }
            return Ok(format!("{} = {};", lhs, self.emit_expr(&args[1], ctx)?));
        }

        // the delay/smooth family; the trailing argument (or the input
        // itself) is the initial value
        let (input, time_arg, init_arg) = match args.len() {
            3 => (&args[0], &args[1], &args[2]),
            _ => (&args[0], &args[1], &args[0]),
        };
        if init {
            return Ok(format!("{} = {};", lhs, self.emit_expr(init_arg, ctx)?));
        }
        let helper = level_helper_of(var).expect("level primitive");
        let base = self.slot_bases[&var.ref_id];
        let slot = if ctx.flat == "0" {
            format!("{}", base)
        } else {
            format!("{} + {}", base, ctx.flat)
        };
        Ok(format!(
            "{} = {}({}, {}, {}, {}, _time_step);",
            lhs,
            helper,
            slot,
            self.emit_expr(input, ctx)?,
            self.emit_expr(time_arg, ctx)?,
            self.emit_expr(init_arg, ctx)?
        ))
    }

    /// Open one loop per dimension subscript; index subscripts pin their
    /// storage position. Returns the loop header lines, the substitution
    /// context, and the LHS storage access.
    fn open_loops(&self, var: &Variable) -> Result<(Vec<String>, LoopCtx, String)> {
        let subscripts = &self.analysis.subscripts;
        let mut loops = Vec::new();
        let mut ctx = LoopCtx::default();
        let mut lhs = var.var_name.clone();

        for sub in var.subscripts.iter() {
            if subscripts.is_index(sub) {
                let position = subscripts.index_position(sub)?;
                let _ = write!(lhs, "[{}]", position);
                // separated records pin their family's position, so the
                // equation's dimension references land on this element
                ctx.by_family
                    .entry(subscripts.family(sub)?.to_string())
                    .or_insert_with(|| position.to_string());
                continue;
            }
            let family = subscripts.family(sub)?.to_string();
            let size = subscripts.sub(sub).map(|s| s.size()).unwrap_or_default();
            if ctx.depth >= LOOP_VARS.len() {
                return model_err!(
                    Generic,
                    format!("{} has too many dimensions", var.ref_id)
                );
            }
            let loop_var = LOOP_VARS[ctx.depth];
            loops.push(format!(
                "for (size_t {v} = 0; {v} < {n}; {v}++) {{",
                v = loop_var,
                n = size
            ));
            let index_expr = if sub == &family {
                loop_var.to_string()
            } else {
                format!("__idx{}[{}]", sub, loop_var)
            };
            let _ = write!(lhs, "[{}]", index_expr);
            ctx.flat = if ctx.flat == "0" {
                loop_var.to_string()
            } else {
                format!("({} * {} + {})", ctx.flat, size, loop_var)
            };
            ctx.by_dim.insert(sub.clone(), index_expr.clone());
            ctx.by_family.entry(family).or_insert(index_expr);
            ctx.depth += 1;
        }
        Ok((loops, ctx, lhs))
    }

    fn emit_expr(&self, expr: &Expr, ctx: &LoopCtx) -> Result<String> {
        let subscripts = &self.analysis.subscripts;
        let text = match expr {
            Expr::Const(_, value) => c_double(*value),
            Expr::Var(id) => {
                let id = canonicalize(id);
                if id == TIME_VAR {
                    TIME_VAR.to_string()
                } else if subscripts.is_dimension(&id) {
                    // a dimension used as a value is its one-based position
                    let index = self.index_expr_for_dim(&id, ctx)?;
                    format!("((double)({}) + 1.0)", index)
                } else if subscripts.is_index(&id) {
                    c_double((subscripts.index_position(&id)? + 1) as f64)
                } else {
                    self.ref_expr(&id, &[], ctx)?
                }
            }
            Expr::Subscript(id, subs) => {
                let subs: Vec<Ident> = subs.iter().map(|s| canonicalize(s)).collect();
                let subs = subscripts.normalize_subscripts(&subs);
                self.ref_expr(&canonicalize(id), &subs, ctx)?
            }
            Expr::App(func, args) => {
                let func = canonicalize(func);
                if let Some(helper) = c_helper(&func) {
                    let args: Result<Vec<String>> =
                        args.iter().map(|a| self.emit_expr(a, ctx)).collect();
                    format!("{}({})", helper, args?.join(", "))
                } else if is_level_fn(&func) || func == "_initial" || func == "_with_lookup" {
                    return model_err!(
                        Generic,
                        format!("{} may only appear at the top of an equation", func)
                    );
                } else {
                    // a lookup variable applied to an argument
                    let target = self.analysis.variables.records_named(&func);
                    let is_lookup = target.first().map(|&i| {
                        matches!(
                            self.analysis.variables.get(i).var_type,
                            VarType::Lookup | VarType::Data
                        )
                    });
                    if is_lookup != Some(true) || args.len() != 1 {
                        return model_err!(UnknownBuiltin, func);
                    }
                    format!("_LOOKUP({}, {})", func, self.emit_expr(&args[0], ctx)?)
                }
            }
            Expr::Op1(op, l) => {
                let l = self.emit_expr(l, ctx)?;
                match op {
                    UnaryOp::Positive => l,
                    UnaryOp::Negative => format!("-{}", l),
                    UnaryOp::Not => format!("!({})", l),
                }
            }
            Expr::Op2(op, l, r) => {
                let l = self.emit_expr(l, ctx)?;
                let r = self.emit_expr(r, ctx)?;
                match op {
                    BinaryOp::Exp => format!("pow({}, {})", l, r),
                    BinaryOp::Mod => format!("_MODULO({}, {})", l, r),
                    _ => {
                        let op = match op {
                            BinaryOp::Add => "+",
                            BinaryOp::Sub => "-",
                            BinaryOp::Mul => "*",
                            BinaryOp::Div => "/",
                            BinaryOp::Gt => ">",
                            BinaryOp::Lt => "<",
                            BinaryOp::Gte => ">=",
                            BinaryOp::Lte => "<=",
                            BinaryOp::Eq => "==",
                            BinaryOp::Neq => "!=",
                            BinaryOp::And => "&&",
                            BinaryOp::Or => "||",
                            BinaryOp::Exp | BinaryOp::Mod => unreachable!(),
                        };
                        format!("({} {} {})", l, op, r)
                    }
                }
            }
            Expr::If(cond, t, f) => format!(
                "_IF_THEN_ELSE({}, {}, {})",
                self.emit_expr(cond, ctx)?,
                self.emit_expr(t, ctx)?,
                self.emit_expr(f, ctx)?
            ),
        };
        Ok(text)
    }

    /// Storage access for a referenced variable, translating dimension
    /// subscripts through the active loop indices (and mapping tables
    /// for cross-family references).
    fn ref_expr(&self, name: &str, subs: &[Ident], ctx: &LoopCtx) -> Result<String> {
        if name == TIME_VAR {
            return Ok(TIME_VAR.to_string());
        }
        let records = self.analysis.variables.records_named(name);
        let rep = match records.first() {
            Some(&i) => self.analysis.variables.get(i),
            None => return model_err!(DoesNotExist, name.to_string()),
        };

        if matches!(rep.var_type, VarType::Lookup | VarType::Data) {
            // a data variable used as a value reads its series at the
            // current time
            return Ok(format!("_LOOKUP({}, _time)", name));
        }

        if subs.is_empty() {
            if rep.subscripts.is_empty() {
                return Ok(name.to_string());
            }
            return model_err!(
                Generic,
                format!("array reference {} needs explicit subscripts", name)
            );
        }
        if subs.len() != rep.subscripts.len() {
            return model_err!(
                Generic,
                format!("wrong subscript count in reference to {}", name)
            );
        }

        let subscripts = &self.analysis.subscripts;
        let mut access = name.to_string();
        for sub in subs.iter() {
            if subscripts.is_index(sub) {
                let _ = write!(access, "[{}]", subscripts.index_position(sub)?);
            } else {
                let _ = write!(access, "[{}]", self.index_expr_for_dim(sub, ctx)?);
            }
        }
        Ok(access)
    }

    /// The C index expression standing for a dimension inside the
    /// current loops: the dimension's own loop, a same-family loop, or a
    /// mapped translation of another family's loop.
    fn index_expr_for_dim(&self, dim: &str, ctx: &LoopCtx) -> Result<String> {
        let subscripts = &self.analysis.subscripts;
        if let Some(expr) = ctx.by_dim.get(dim) {
            return Ok(expr.clone());
        }
        if let Some(expr) = ctx.by_family.get(subscripts.family(dim)?) {
            return Ok(expr.clone());
        }
        for (lhs_dim, expr) in ctx.by_dim.iter() {
            if subscripts.mapping(dim, lhs_dim).is_some() {
                return Ok(format!("__map{}{}[{}]", dim, lhs_dim, expr));
            }
        }
        model_err!(
            SubscriptMismatch,
            format!("no loop index for dimension {}", dim)
        )
    }

    fn store_outputs(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "void storeOutputs(void) {{");
        let _ = writeln!(out, "  __output_begin_row(_time);");
        for name in self.spec.output_vars.iter() {
            for access in self.spec_var_accesses(name)? {
                let _ = writeln!(out, "  __output({});", access);
            }
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    fn set_inputs(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "void setInputs(const double *u) {{");
        let mut slot = 0usize;
        for name in self.spec.input_vars.iter() {
            for access in self.spec_var_accesses(name)? {
                if access.starts_with("_LOOKUP(") {
                    continue; // data inputs are driven by their series
                }
                let _ = writeln!(out, "  {} = u[{}];", access, slot);
                slot += 1;
            }
        }
        if slot == 0 {
            let _ = writeln!(out, "  (void)u;");
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(out)
    }

    /// Concrete storage accesses for a spec input/output var: a scalar
    /// cell, one element per named subscript, or every element of an
    /// array unrolled row-major. Unknown names were already diagnosed
    /// and are skipped.
    fn spec_var_accesses(&self, name: &str) -> Result<Vec<String>> {
        let subscripts = &self.analysis.subscripts;
        let (base, subs) = parse_spec_var(name);
        let records = self.analysis.variables.records_named(&base);
        let rep = match records.first() {
            Some(&i) => self.analysis.variables.get(i),
            None => return Ok(Vec::new()),
        };
        if matches!(rep.var_type, VarType::Lookup | VarType::Data) {
            return Ok(vec![format!("_LOOKUP({}, _time)", base)]);
        }
        if rep.subscripts.is_empty() {
            return Ok(vec![base]);
        }

        let subs = if subs.is_empty() {
            rep.subscripts.clone()
        } else {
            subscripts.normalize_subscripts(&subs)
        };
        if subs.len() != rep.subscripts.len() {
            return Ok(Vec::new());
        }

        // expand dimensions, pin indices
        let positions: Vec<Vec<usize>> = subs
            .iter()
            .map(|s| {
                subscripts
                    .index_names_for_subscript(s)
                    .iter()
                    .map(|i| subscripts.index_position(i).unwrap_or_default())
                    .collect()
            })
            .collect();
        let mut accesses = vec![base];
        for alternatives in positions.iter() {
            let mut next = Vec::with_capacity(accesses.len() * alternatives.len());
            for access in accesses.iter() {
                for position in alternatives.iter() {
                    next.push(format!("{}[{}]", access, position));
                }
            }
            accesses = next;
        }
        Ok(accesses)
    }

    fn run_model(&self) -> Result<String> {
        for required in ["_initial_time", "_final_time", "_time_step"] {
            if self.analysis.variables.records_named(required).is_empty() {
                return model_err!(DoesNotExist, required.to_string());
            }
        }
        let saveper = if self.analysis.variables.records_named("_saveper").is_empty() {
            "_time_step"
        } else {
            "_saveper"
        };

        let mut out = String::new();
        let _ = writeln!(out, "void run_model(void) {{");
        let _ = writeln!(out, "  __output_reset();");
        let _ = writeln!(out, "  __reset_state();");
        let _ = writeln!(out, "  initConstants();");
        let _ = writeln!(out, "  initLookups();");
        let _ = writeln!(out, "  _time = _initial_time;");
        let _ = writeln!(out, "  initLevels();");
        let _ = writeln!(
            out,
            "  size_t save_every = (size_t)({} / _time_step + 0.5);",
            saveper
        );
        let _ = writeln!(out, "  if (save_every == 0) save_every = 1;");
        let _ = writeln!(out, "  size_t step = 0;");
        let _ = writeln!(out, "  for (;;) {{");
        let _ = writeln!(out, "    evalAux();");
        let _ = writeln!(out, "    if (step % save_every == 0) storeOutputs();");
        let _ = writeln!(out, "    if (_time >= _final_time) break;");
        let _ = writeln!(out, "    evalLevels();");
        let _ = writeln!(out, "    step += 1;");
        let _ = writeln!(
            out,
            "    _time = _initial_time + ((double)step) * _time_step;"
        );
        let _ = writeln!(out, "  }}");
        let _ = writeln!(out, "}}");
        Ok(out)
    }
}

struct LoopCtx {
    /// LHS dimension name → C index expression.
    by_dim: BTreeMap<Ident, String>,
    /// Family name → C index expression of the first loop over it.
    by_family: BTreeMap<Ident, String>,
    /// Flattened element offset across the open loops ("0" when scalar).
    flat: String,
    depth: usize,
}

impl Default for LoopCtx {
    fn default() -> Self {
        LoopCtx {
            by_dim: BTreeMap::new(),
            by_family: BTreeMap::new(),
            flat: "0".to_string(),
            depth: 0,
        }
    }
}

fn level_helper_of(var: &Variable) -> Option<&'static str> {
    match &var.eqn {
        Rhs::Expr(Expr::App(func, _)) => c_level_helper(&canonicalize(func)),
        _ => None,
    }
}

/// Number of storage elements a record's own loops cover.
fn element_count(analysis: &Analysis, var: &Variable) -> Result<usize> {
    let mut count = 1usize;
    for sub in var.subscripts.iter() {
        if analysis.subscripts.is_dimension(sub) {
            count *= analysis
                .subscripts
                .sub(sub)
                .map(|s| s.size())
                .unwrap_or(1);
        }
    }
    Ok(count)
}

fn c_double(value: f64) -> String {
    format!("{:?}", value)
}

fn new_lookup(points: &[(f64, f64)]) -> String {
    let flat: Vec<String> = points
        .iter()
        .flat_map(|(x, y)| [c_double(*x), c_double(*y)])
        .collect();
    format!(
        "__new_lookup({}, (const double[]){{ {} }})",
        points.len(),
        flat.join(", ")
    )
}

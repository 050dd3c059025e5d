// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Builders shared by the scenario tests.

use crate::ast::{BinaryOp, Expr};
use crate::datamodel::{EquationDef, Lhs, MappingDef, ParsedModel, Rhs, SubscriptDef};

pub fn v(name: &str) -> Expr {
    Expr::Var(name.to_string())
}

pub fn n(value: f64) -> Expr {
    Expr::Const(format!("{:?}", value), value)
}

pub fn add(l: Expr, r: Expr) -> Expr {
    Expr::Op2(BinaryOp::Add, Box::new(l), Box::new(r))
}

pub fn mul(l: Expr, r: Expr) -> Expr {
    Expr::Op2(BinaryOp::Mul, Box::new(l), Box::new(r))
}

pub fn subscript(name: &str, subs: &[&str]) -> Expr {
    Expr::Subscript(
        name.to_string(),
        subs.iter().map(|s| s.to_string()).collect(),
    )
}

pub fn app(func: &str, args: Vec<Expr>) -> Expr {
    Expr::App(func.to_string(), args)
}

pub fn integ(flow: Expr, init: Expr) -> Expr {
    app("INTEG", vec![flow, init])
}

pub fn eqn(name: &str, subs: &[&str], rhs: Rhs) -> EquationDef {
    EquationDef {
        lhs: Lhs {
            name: name.to_string(),
            subscripts: subs.iter().map(|s| s.to_string()).collect(),
        },
        rhs,
        units: String::new(),
        documentation: String::new(),
    }
}

pub fn aux(name: &str, subs: &[&str], expr: Expr) -> EquationDef {
    eqn(name, subs, Rhs::Expr(expr))
}

pub fn dim(name: &str, elements: &[&str]) -> SubscriptDef {
    SubscriptDef {
        name: name.to_string(),
        elements: elements.iter().map(|e| e.to_string()).collect(),
        mappings: vec![],
    }
}

pub fn dim_mapped(name: &str, elements: &[&str], to: &str, value: &[&str]) -> SubscriptDef {
    SubscriptDef {
        mappings: vec![MappingDef {
            to: to.to_string(),
            value: value.iter().map(|e| e.to_string()).collect(),
        }],
        ..dim(name, elements)
    }
}

pub fn model(subscripts: Vec<SubscriptDef>, equations: Vec<EquationDef>) -> ParsedModel {
    ParsedModel {
        subscripts,
        equations,
    }
}

/// The four sim-spec constants every runnable model carries.
pub fn sim_specs(start: f64, stop: f64, dt: f64, saveper: f64) -> Vec<EquationDef> {
    vec![
        aux("INITIAL TIME", &[], n(start)),
        aux("FINAL TIME", &[], n(stop)),
        aux("TIME STEP", &[], n(dt)),
        aux("SAVEPER", &[], n(saveper)),
    ]
}

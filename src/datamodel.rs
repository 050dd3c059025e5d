// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The parse-tree form of a Vensim model, as produced by the external
//! grammar front-end. Names here are raw model text; canonicalization
//! happens when the variable reader ingests these records.

use crate::ast::Expr;

/// One `DimA: a1, a2 -> (DimB: ...)` subscript-range declaration.
#[derive(Clone, PartialEq, Debug)]
pub struct SubscriptDef {
    pub name: String,
    /// Raw value list; entries may name indices or other dimensions.
    pub elements: Vec<String>,
    pub mappings: Vec<MappingDef>,
}

/// A `-> (To: e1, e2, ...)` mapping clause. An empty `value` is the
/// shorthand `-> To` form.
#[derive(Clone, PartialEq, Debug)]
pub struct MappingDef {
    pub to: String,
    pub value: Vec<String>,
}

/// The left-hand side of one equation: `name[sub1, sub2]`.
#[derive(Clone, PartialEq, Debug)]
pub struct Lhs {
    pub name: String,
    pub subscripts: Vec<String>,
}

impl Lhs {
    pub fn text(&self) -> String {
        if self.subscripts.is_empty() {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.subscripts.join(","))
        }
    }
}

/// The right-hand side of one equation.
#[derive(Clone, PartialEq, Debug)]
pub enum Rhs {
    Expr(Expr),
    /// A lookup table literal: `x( (0,0), (1,1) )`.
    Lookup(Vec<(f64, f64)>),
    /// `WITH LOOKUP(input, ((x0,y0), ...))`.
    WithLookup(Expr, Vec<(f64, f64)>),
    /// A data declaration with no equation; values come from external data.
    Data,
    /// A `GET DIRECT DATA('tag', ...)` equation, reduced to its tag; the
    /// tabular values arrive through the spec's direct-data map.
    DirectData(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct EquationDef {
    pub lhs: Lhs,
    pub rhs: Rhs,
    pub units: String,
    pub documentation: String,
}

/// A whole parsed model: subscript-range declarations plus equations,
/// in source order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ParsedModel {
    pub subscripts: Vec<SubscriptDef>,
    pub equations: Vec<EquationDef>,
}

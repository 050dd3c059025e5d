// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Variable records and the reader that populates them from the parse
//! tree, one record per left-hand-side occurrence. Non-apply-to-all
//! arrays produce one record per separated subscript combination.

use std::collections::HashMap;
use std::fmt;

use crate::ast::print_eqn;
use crate::common::{canonicalize, DimensionName, Ident, RefId, Result, TIME_VAR};
use crate::datamodel::{EquationDef, ParsedModel, Rhs};
use crate::spec::Spec;
use crate::sub_err;
use crate::subscript::SubscriptTable;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VarType {
    Const,
    Data,
    Lookup,
    Aux,
    Level,
    Initial,
    /// Only the `_time` placeholder record carries this.
    Unspecified,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            VarType::Const => "const",
            VarType::Data => "data",
            VarType::Lookup => "lookup",
            VarType::Aux => "aux",
            VarType::Level => "level",
            VarType::Initial => "initial",
            VarType::Unspecified => "unspecified",
        };
        write!(f, "{}", name)
    }
}

/// A raw reference recorded during the RHS walk, before resolution into
/// refIds: the canonical name plus the subscripts used at the site.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Reference {
    pub name: Ident,
    pub subscripts: Vec<Ident>,
}

impl Reference {
    pub fn bare(name: &str) -> Reference {
        Reference {
            name: name.to_string(),
            subscripts: Vec::new(),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    pub model_lhs: String,
    pub var_name: Ident,
    /// Canonical subscripts in normal order (ascending by family).
    pub subscripts: Vec<Ident>,
    /// Assigned by the analyzer; empty until then.
    pub ref_id: RefId,
    pub var_type: VarType,
    pub has_init_value: bool,
    /// Resolved refIds used during per-step evaluation.
    pub references: Vec<RefId>,
    /// Resolved refIds used during initialization.
    pub init_references: Vec<RefId>,
    pub raw_references: Vec<Reference>,
    pub raw_init_references: Vec<Reference>,
    /// Dimensions forcibly expanded by the reader (non-apply-to-all).
    pub separation_dims: Vec<DimensionName>,
    /// Lookup table points for `lookup` and `data` variables.
    pub points: Option<Vec<(f64, f64)>>,
    /// The RHS, retained so the emitter can re-emit expressions.
    pub eqn: Rhs,
    pub model_formula: String,
}

impl Variable {
    pub fn placeholder(var_name: &str) -> Variable {
        Variable {
            model_lhs: String::new(),
            var_name: var_name.to_string(),
            subscripts: Vec::new(),
            ref_id: String::new(),
            var_type: VarType::Unspecified,
            has_init_value: false,
            references: Vec::new(),
            init_references: Vec::new(),
            raw_references: Vec::new(),
            raw_init_references: Vec::new(),
            separation_dims: Vec::new(),
            points: None,
            eqn: Rhs::Data,
            model_formula: String::new(),
        }
    }

    pub fn is_separated(&self) -> bool {
        !self.separation_dims.is_empty()
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct VariableTable {
    vars: Vec<Variable>,
    by_ref_id: HashMap<RefId, usize>,
}

impl VariableTable {
    /// Walk the parse tree and produce one record per LHS occurrence,
    /// separating records along spec-listed dimensions, then append the
    /// `_time` placeholder.
    pub fn read(
        model: &ParsedModel,
        spec: &Spec,
        subscripts: &SubscriptTable,
    ) -> Result<VariableTable> {
        let mut table = VariableTable::default();
        for eqn in model.equations.iter() {
            table.read_equation(eqn, spec, subscripts)?;
        }
        table.vars.push(Variable::placeholder(TIME_VAR));
        Ok(table)
    }

    fn read_equation(
        &mut self,
        eqn: &EquationDef,
        spec: &Spec,
        subscripts: &SubscriptTable,
    ) -> Result<()> {
        let var_name = canonicalize(&eqn.lhs.name);
        let separation_spec = spec.separation_dims_for(&var_name);

        // per-position alternatives; separated dimensions expand to their
        // index lists, everything else stays put
        let mut alternatives: Vec<Vec<Ident>> = Vec::with_capacity(eqn.lhs.subscripts.len());
        let mut separation_dims: Vec<DimensionName> = Vec::new();
        for raw_sub in eqn.lhs.subscripts.iter() {
            let sub = canonicalize(raw_sub);
            if !subscripts.is_subscript(&sub) {
                return sub_err!(
                    DoesNotExist,
                    format!("{} in {}", sub, eqn.lhs.text())
                );
            }
            if subscripts.is_dimension(&sub) && separation_spec.contains(&sub) {
                separation_dims.push(sub.clone());
                alternatives.push(subscripts.index_names_for_subscript(&sub));
            } else {
                alternatives.push(vec![sub]);
            }
        }

        let model_formula = match &eqn.rhs {
            Rhs::Expr(expr) => print_eqn(expr),
            Rhs::Lookup(points) => format_points(points),
            Rhs::WithLookup(expr, points) => {
                format!("WITH LOOKUP({}, {})", print_eqn(expr), format_points(points))
            }
            Rhs::Data => String::new(),
            Rhs::DirectData(tag) => format!("GET DIRECT DATA('{}')", tag),
        };
        let points = match &eqn.rhs {
            Rhs::Lookup(points) | Rhs::WithLookup(_, points) => Some(points.clone()),
            _ => None,
        };

        for combination in cross_product(&alternatives).into_iter() {
            self.vars.push(Variable {
                model_lhs: eqn.lhs.text(),
                var_name: var_name.clone(),
                subscripts: subscripts.normalize_subscripts(&combination),
                ref_id: String::new(),
                var_type: VarType::Aux,
                has_init_value: false,
                references: Vec::new(),
                init_references: Vec::new(),
                raw_references: Vec::new(),
                raw_init_references: Vec::new(),
                separation_dims: separation_dims.clone(),
                points: points.clone(),
                eqn: eqn.rhs.clone(),
                model_formula: model_formula.clone(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.vars.iter_mut()
    }

    pub fn get(&self, i: usize) -> &Variable {
        &self.vars[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Variable {
        &mut self.vars[i]
    }

    pub fn push(&mut self, var: Variable) {
        self.vars.push(var);
    }

    /// Indices of all records sharing a canonical variable name.
    pub fn records_named(&self, var_name: &str) -> Vec<usize> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.var_name == var_name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rebuild the refId index; the analyzer calls this after refId
    /// assignment and again after synthesizing data records.
    pub fn rebuild_ref_index(&mut self) {
        self.by_ref_id = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.ref_id.is_empty())
            .map(|(i, v)| (v.ref_id.clone(), i))
            .collect();
    }

    pub fn get_by_ref_id(&self, ref_id: &str) -> Option<&Variable> {
        self.by_ref_id.get(ref_id).map(|&i| &self.vars[i])
    }

    pub fn var_type_of(&self, ref_id: &str) -> Option<VarType> {
        self.get_by_ref_id(ref_id).map(|v| v.var_type)
    }
}

pub(crate) fn format_points(points: &[(f64, f64)]) -> String {
    let pairs: Vec<String> = points
        .iter()
        .map(|(x, y)| format!("({:?},{:?})", x, y))
        .collect();
    format!("({})", pairs.join(","))
}

/// Ordered cartesian product over per-position alternatives. An empty
/// alternatives list yields the single scalar (empty) combination.
fn cross_product(alternatives: &[Vec<Ident>]) -> Vec<Vec<Ident>> {
    let mut combinations: Vec<Vec<Ident>> = vec![Vec::new()];
    for alts in alternatives.iter() {
        let mut next = Vec::with_capacity(combinations.len() * alts.len());
        for combination in combinations.iter() {
            for alt in alts.iter() {
                let mut combination = combination.clone();
                combination.push(alt.clone());
                next.push(combination);
            }
        }
        combinations = next;
    }
    combinations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::datamodel::{Lhs, SubscriptDef};

    fn model(equations: Vec<EquationDef>) -> ParsedModel {
        ParsedModel {
            subscripts: vec![SubscriptDef {
                name: "R".to_string(),
                elements: vec!["r1".to_string(), "r2".to_string(), "r3".to_string()],
                mappings: vec![],
            }],
            equations,
        }
    }

    fn eqn(name: &str, subscripts: &[&str], rhs: Rhs) -> EquationDef {
        EquationDef {
            lhs: Lhs {
                name: name.to_string(),
                subscripts: subscripts.iter().map(|s| s.to_string()).collect(),
            },
            rhs,
            units: String::new(),
            documentation: String::new(),
        }
    }

    fn read(model: &ParsedModel, spec: &Spec) -> VariableTable {
        let subs = SubscriptTable::build(&model.subscripts, spec).unwrap();
        VariableTable::read(model, spec, &subs).unwrap()
    }

    #[test]
    fn test_scalar_reader() {
        let model = model(vec![eqn("x", &[], Rhs::Expr(Expr::Const("1".into(), 1.0)))]);
        let table = read(&model, &Spec::default());
        // the variable plus the _time placeholder
        assert_eq!(2, table.len());
        assert_eq!("_x", table.get(0).var_name);
        assert_eq!("x", table.get(0).model_lhs);
        assert_eq!(TIME_VAR, table.get(1).var_name);
        assert_eq!(VarType::Unspecified, table.get(1).var_type);
    }

    #[test]
    fn test_apply_to_all_single_record() {
        let model = model(vec![eqn("a", &["R"], Rhs::Expr(Expr::default()))]);
        let table = read(&model, &Spec::default());
        assert_eq!(1, table.records_named("_a").len());
        assert_eq!(vec!["_r"], table.get(0).subscripts);
        assert!(!table.get(0).is_separated());
    }

    #[test]
    fn test_explicit_index_enumeration() {
        let model = model(vec![
            eqn("a", &["r1"], Rhs::Expr(Expr::default())),
            eqn("a", &["r2"], Rhs::Expr(Expr::default())),
        ]);
        let table = read(&model, &Spec::default());
        let records = table.records_named("_a");
        assert_eq!(2, records.len());
        assert_eq!(vec!["_r1"], table.get(records[0]).subscripts);
        assert_eq!(vec!["_r2"], table.get(records[1]).subscripts);
    }

    #[test]
    fn test_special_separation_dims() {
        let spec = Spec::from_json(r#"{"specialSeparationDims": {"a": ["R"]}}"#).unwrap();
        let model = model(vec![eqn("a", &["R"], Rhs::Expr(Expr::default()))]);
        let table = read(&model, &spec);
        let records = table.records_named("_a");
        assert_eq!(3, records.len());
        for (record, index) in records.iter().zip(["_r1", "_r2", "_r3"]) {
            assert_eq!(vec![index.to_string()], table.get(*record).subscripts);
            assert_eq!(vec!["_r".to_string()], table.get(*record).separation_dims);
        }
    }

    #[test]
    fn test_subscripts_normalized() {
        let mut m = model(vec![eqn("c", &["R", "G"], Rhs::Expr(Expr::default()))]);
        m.subscripts.push(SubscriptDef {
            name: "G".to_string(),
            elements: vec!["g1".to_string(), "g2".to_string()],
            mappings: vec![],
        });
        let table = read(&m, &Spec::default());
        assert_eq!(vec!["_g", "_r"], table.get(0).subscripts);
    }

    #[test]
    fn test_lookup_points_attached() {
        let points = vec![(0.0, 0.0), (1.0, 2.0)];
        let model = model(vec![eqn("t", &[], Rhs::Lookup(points.clone()))]);
        let table = read(&model, &Spec::default());
        assert_eq!(Some(points), table.get(0).points);
        assert_eq!("((0.0,0.0),(1.0,2.0))", table.get(0).model_formula);
    }

    #[test]
    fn test_unknown_subscript_errors() {
        let model = model(vec![eqn("a", &["Zip"], Rhs::Expr(Expr::default()))]);
        let subs = SubscriptTable::build(&model.subscripts, &Spec::default()).unwrap();
        let err = VariableTable::read(&model, &Spec::default(), &subs).unwrap_err();
        assert_eq!(crate::common::ErrorCode::DoesNotExist, err.code);
    }
}

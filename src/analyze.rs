// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The analysis context and its ordered passes: non-apply-to-all
//! detection, refId assignment, reference resolution (with data-equation
//! synthesis), const upgrade, constant-reference pruning, and spec
//! validation. After `Analysis::build` returns, the variable table is
//! read-only.

use std::collections::{BTreeMap, HashSet};

use crate::ast::Expr;
use crate::common::{Error, ErrorCode, ErrorKind, Ident, RefId, Result, TIME_VAR};
use crate::datamodel::{ParsedModel, Rhs};
use crate::equation::analyze_equations;
use crate::spec::{parse_spec_var, DirectData, ExtData, Spec};
use crate::subscript::SubscriptTable;
use crate::variable::{format_points, Reference, Variable, VariableTable, VarType};
use crate::{analysis_err, model_err};

#[derive(Debug)]
pub struct Analysis {
    pub subscripts: SubscriptTable,
    pub variables: VariableTable,
    /// varName → per-position expansion flags, for names defined by more
    /// than one record.
    pub non_apply_to_all: BTreeMap<Ident, Vec<bool>>,
    /// Non-fatal diagnostics (unknown spec vars), in spec order.
    pub diagnostics: Vec<Error>,
}

impl Analysis {
    /// Run the whole analysis pipeline over a parsed model.
    pub fn build(
        model: &ParsedModel,
        spec: &Spec,
        ext_data: &ExtData,
        direct_data: &DirectData,
    ) -> Result<Analysis> {
        let subscripts = SubscriptTable::build(&model.subscripts, spec)?;
        let mut variables = VariableTable::read(model, spec, &subscripts)?;
        analyze_equations(&mut variables, &subscripts, spec, direct_data)?;

        let mut analysis = Analysis {
            subscripts,
            variables,
            non_apply_to_all: BTreeMap::new(),
            diagnostics: Vec::new(),
        };
        analysis.attach_data_series(ext_data);
        analysis.detect_non_apply_to_all();
        analysis.assign_ref_ids()?;
        analysis.resolve_references(ext_data)?;
        analysis.upgrade_consts();
        analysis.prune_constant_references();
        analysis.validate_spec_vars(spec, ext_data);
        Ok(analysis)
    }

    pub fn is_non_apply_to_all(&self, var_name: &str) -> bool {
        self.non_apply_to_all.contains_key(var_name)
    }

    pub fn expansion_flags(&self, var_name: &str) -> Option<&Vec<bool>> {
        self.non_apply_to_all.get(var_name)
    }

    /// Model-declared data variables take their series from the
    /// external-data map.
    fn attach_data_series(&mut self, ext_data: &ExtData) {
        for var in self.variables.iter_mut() {
            if var.var_type == VarType::Data && var.points.is_none() {
                var.points = ext_data.get(&var.var_name).cloned();
            }
        }
    }

    /// Group records by varName; a group of more than one record is
    /// non-apply-to-all, with a per-position flag set wherever the
    /// group's records disagree on the subscript.
    fn detect_non_apply_to_all(&mut self) {
        let mut groups: BTreeMap<Ident, Vec<usize>> = BTreeMap::new();
        for (i, var) in self.variables.iter().enumerate() {
            groups.entry(var.var_name.clone()).or_default().push(i);
        }

        for (var_name, records) in groups.into_iter() {
            if records.len() < 2 {
                continue;
            }
            let first = self.variables.get(records[0]).subscripts.clone();
            let mut flags = vec![false; first.len()];
            for &r in records[1..].iter() {
                for (p, sub) in self.variables.get(r).subscripts.iter().enumerate() {
                    if p < flags.len() && *sub != first[p] {
                        flags[p] = true;
                    }
                }
            }
            self.non_apply_to_all.insert(var_name, flags);
        }
    }

    /// Non-apply-to-all records embed their subscripts in the refId;
    /// everything else gets the bare varName, subscripted or not.
    fn assign_ref_ids(&mut self) -> Result<()> {
        let non_apply_to_all = self.non_apply_to_all.clone();
        for var in self.variables.iter_mut() {
            var.ref_id = if non_apply_to_all.contains_key(&var.var_name) {
                format!("{}[{}]", var.var_name, var.subscripts.join(","))
            } else {
                var.var_name.clone()
            };
        }

        let mut seen: HashSet<RefId> = HashSet::new();
        for var in self.variables.iter() {
            if !seen.insert(var.ref_id.clone()) {
                return model_err!(DuplicateVariable, var.ref_id.clone());
            }
        }
        self.variables.rebuild_ref_index();
        Ok(())
    }

    /// Replace raw name references with refIds. A reference with no
    /// defining record but a series in the external-data map synthesizes
    /// a `WITH LOOKUP(Time, ...)` data equation.
    fn resolve_references(&mut self, ext_data: &ExtData) -> Result<()> {
        for i in 0..self.variables.len() {
            if self.variables.get(i).var_name == TIME_VAR {
                continue;
            }
            let raw_refs = self.variables.get(i).raw_references.clone();
            let raw_init_refs = self.variables.get(i).raw_init_references.clone();

            let mut references = Vec::new();
            for r in raw_refs.iter() {
                let r = self.specialize_reference(i, r);
                for ref_id in self.resolve_one(i, &r, ext_data)? {
                    if !references.contains(&ref_id) {
                        references.push(ref_id);
                    }
                }
            }
            let mut init_references = Vec::new();
            for r in raw_init_refs.iter() {
                let r = self.specialize_reference(i, r);
                for ref_id in self.resolve_one(i, &r, ext_data)? {
                    if !init_references.contains(&ref_id) {
                        init_references.push(ref_id);
                    }
                }
            }

            let var = self.variables.get_mut(i);
            var.references = references;
            var.init_references = init_references;
        }
        Ok(())
    }

    /// A record produced by dimension separation keeps its equation's
    /// dimension subscripts; references through a separated dimension
    /// bind to this record's own element of it.
    fn specialize_reference(&self, referencing: usize, reference: &Reference) -> Reference {
        let var = self.variables.get(referencing);
        if var.separation_dims.is_empty() || reference.subscripts.is_empty() {
            return reference.clone();
        }
        let subscripts = &self.subscripts;
        let mut subs = reference.subscripts.clone();
        for s in subs.iter_mut() {
            if !var.separation_dims.contains(s) {
                continue;
            }
            let family = subscripts.family(s).ok();
            if let Some(index) = var
                .subscripts
                .iter()
                .find(|t| subscripts.is_index(t) && subscripts.family(t).ok() == family)
            {
                *s = index.clone();
            }
        }
        Reference {
            name: reference.name.clone(),
            subscripts: subs,
        }
    }

    fn resolve_one(
        &mut self,
        referencing: usize,
        reference: &Reference,
        ext_data: &ExtData,
    ) -> Result<Vec<RefId>> {
        let candidates = self.variables.records_named(&reference.name);
        if candidates.is_empty() {
            if let Some(series) = ext_data.get(&reference.name) {
                let ref_id = self.synthesize_data_var(&reference.name, series);
                return Ok(vec![ref_id]);
            }
            let lhs = self.variables.get(referencing).model_lhs.clone();
            return analysis_err!(
                DanglingReference,
                format!("{} referenced by {}", reference.name, lhs)
            );
        }

        self.check_loop_cover(referencing, reference)?;

        let mut ref_ids = Vec::new();
        for &c in candidates.iter() {
            let candidate = self.variables.get(c);
            if self.binds(reference, &candidate.subscripts) {
                ref_ids.push(candidate.ref_id.clone());
            }
        }
        if ref_ids.is_empty() {
            let lhs = self.variables.get(referencing).model_lhs.clone();
            return analysis_err!(
                SubscriptMismatch,
                format!(
                    "{}[{}] referenced by {}",
                    reference.name,
                    reference.subscripts.join(","),
                    lhs
                )
            );
        }
        Ok(ref_ids)
    }

    /// Every dimension a reference mentions must be covered by one of the
    /// referencing variable's own dimensions: the same name, the same
    /// family, or a mapping onto it. A reference by index needs no cover.
    fn check_loop_cover(&self, referencing: usize, reference: &Reference) -> Result<()> {
        let referencing = self.variables.get(referencing);
        for sub in reference.subscripts.iter() {
            if !self.subscripts.is_dimension(sub) {
                continue;
            }
            let covered = referencing.subscripts.iter().any(|lhs_sub| {
                if !self.subscripts.is_dimension(lhs_sub) {
                    return false;
                }
                lhs_sub == sub
                    || self.subscripts.family(lhs_sub).ok() == self.subscripts.family(sub).ok()
                    || self.subscripts.mapping(sub, lhs_sub).is_some()
            });
            if !covered {
                return analysis_err!(
                    SubscriptMismatch,
                    format!(
                        "dimension {} in reference to {} is not a dimension of {}",
                        sub, reference.name, referencing.model_lhs
                    )
                );
            }
        }
        Ok(())
    }

    /// Positional matching of reference-site subscripts against a
    /// candidate record's subscripts. An unsubscripted reference matches
    /// any record of that name.
    fn binds(&self, reference: &Reference, record_subs: &[Ident]) -> bool {
        if reference.subscripts.is_empty() {
            return true;
        }
        if reference.subscripts.len() != record_subs.len() {
            return false;
        }
        reference
            .subscripts
            .iter()
            .zip(record_subs.iter())
            .all(|(r, t)| self.subscript_matches(r, t))
    }

    fn subscript_matches(&self, ref_sub: &Ident, record_sub: &Ident) -> bool {
        if ref_sub == record_sub {
            return true;
        }
        match (
            self.subscripts.is_dimension(ref_sub),
            self.subscripts.is_dimension(record_sub),
        ) {
            // ref index picks an element inside the record's dimension
            (false, true) => self
                .subscripts
                .index_names_for_subscript(record_sub)
                .contains(ref_sub),
            // ref dimension spans this separated record's index
            (true, false) => self
                .subscripts
                .index_names_for_subscript(ref_sub)
                .contains(record_sub),
            // distinct dimensions: subrange containment or a mapping
            (true, true) => {
                let ref_indices = self.subscripts.index_names_for_subscript(ref_sub);
                let record_indices = self.subscripts.index_names_for_subscript(record_sub);
                ref_indices.iter().all(|i| record_indices.contains(i))
                    || self.subscripts.mapping(ref_sub, record_sub).is_some()
            }
            (false, false) => false,
        }
    }

    fn synthesize_data_var(&mut self, name: &str, series: &[(f64, f64)]) -> RefId {
        let mut var = Variable::placeholder(name);
        var.var_type = VarType::Data;
        var.ref_id = name.to_string();
        var.model_lhs = name.to_string();
        var.points = Some(series.to_vec());
        var.eqn = Rhs::WithLookup(Expr::Var(TIME_VAR.to_string()), series.to_vec());
        var.model_formula = format!("WITH LOOKUP(Time, {})", format_points(series));
        self.variables.push(var);
        self.variables.rebuild_ref_index();
        name.to_string()
    }

    /// An aux whose references all land on consts is itself a const
    /// ("literals and references to const-typed variables"); iterate to
    /// fixpoint so chains of such auxes settle.
    fn upgrade_consts(&mut self) {
        loop {
            let mut upgrades: Vec<usize> = Vec::new();
            for (i, var) in self.variables.iter().enumerate() {
                if var.var_type != VarType::Aux
                    || var.references.is_empty()
                    || !var.init_references.is_empty()
                    || matches!(var.eqn, Rhs::WithLookup(_, _))
                {
                    continue;
                }
                let all_const = var
                    .references
                    .iter()
                    .all(|r| self.variables.var_type_of(r) == Some(VarType::Const));
                if all_const {
                    upgrades.push(i);
                }
            }
            if upgrades.is_empty() {
                return;
            }
            for i in upgrades.into_iter() {
                self.variables.get_mut(i).var_type = VarType::Const;
            }
        }
    }

    /// Drop references whose target is a const, data, or lookup record;
    /// they do not constrain evaluation order.
    fn prune_constant_references(&mut self) {
        let pruned: HashSet<RefId> = self
            .variables
            .iter()
            .filter(|v| {
                matches!(
                    v.var_type,
                    VarType::Const | VarType::Data | VarType::Lookup
                )
            })
            .map(|v| v.ref_id.clone())
            .collect();

        for var in self.variables.iter_mut() {
            var.references.retain(|r| !pruned.contains(r));
            var.init_references.retain(|r| !pruned.contains(r));
        }
    }

    /// Every spec input and output var must name a record (possibly one
    /// synthesized from external data). Failures are diagnostics, not
    /// fatal, so listings still emit.
    fn validate_spec_vars(&mut self, spec: &Spec, ext_data: &ExtData) {
        let names: Vec<String> = spec
            .input_vars
            .iter()
            .chain(spec.output_vars.iter())
            .cloned()
            .collect();
        for name in names.iter() {
            let (base, subs) = parse_spec_var(name);
            if self.variables.records_named(&base).is_empty() {
                if let Some(series) = ext_data.get(&base) {
                    self.synthesize_data_var(&base, series);
                } else {
                    self.diagnostics.push(Error::new(
                        ErrorKind::Spec,
                        ErrorCode::UnknownSpecVar,
                        Some(name.clone()),
                    ));
                    continue;
                }
            }
            for sub in subs.iter() {
                if !self.subscripts.is_subscript(sub) {
                    self.diagnostics.push(Error::new(
                        ErrorKind::Spec,
                        ErrorCode::UnknownSpecVar,
                        Some(name.clone()),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::datamodel::{EquationDef, Lhs, SubscriptDef};

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    fn n(value: f64) -> Expr {
        Expr::Const(format!("{:?}", value), value)
    }

    fn add(l: Expr, r: Expr) -> Expr {
        Expr::Op2(BinaryOp::Add, Box::new(l), Box::new(r))
    }

    fn sub(name: &str, subs: &[&str]) -> Expr {
        Expr::Subscript(
            name.to_string(),
            subs.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn eqn(name: &str, subs: &[&str], rhs: Rhs) -> EquationDef {
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

    fn dim(name: &str, elements: &[&str]) -> SubscriptDef {
        SubscriptDef {
            name: name.to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
            mappings: vec![],
        }
    }

    fn build(model: &ParsedModel) -> Analysis {
        Analysis::build(
            model,
            &Spec::default(),
            &ExtData::default(),
            &DirectData::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_scalar_ref_ids_are_bare() {
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![
                eqn("x", &[], Rhs::Expr(n(1.0))),
                eqn("y", &[], Rhs::Expr(add(v("x"), n(2.0)))),
            ],
        };
        let analysis = build(&model);
        assert_eq!("_x", analysis.variables.get(0).ref_id);
        assert_eq!("_y", analysis.variables.get(1).ref_id);
        assert!(analysis.non_apply_to_all.is_empty());
        // x is const, so y's reference to it is pruned
        assert!(analysis.variables.get(1).references.is_empty());
    }

    #[test]
    fn test_apply_to_all_ref_id_is_bare() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2", "r3"])],
            equations: vec![
                eqn("a", &["R"], Rhs::Expr(n(1.0))),
                eqn("b", &["R"], Rhs::Expr(add(sub("a", &["R"]), n(1.0)))),
            ],
        };
        let analysis = build(&model);
        assert_eq!("_a", analysis.variables.get(0).ref_id);
        assert_eq!("_b", analysis.variables.get(1).ref_id);
        assert!(!analysis.is_non_apply_to_all("_a"));
    }

    #[test]
    fn test_non_apply_to_all_expansion() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2", "r3"])],
            equations: vec![
                eqn("a", &["r1"], Rhs::Expr(n(1.0))),
                eqn("a", &["r2"], Rhs::Expr(n(2.0))),
                eqn(
                    "a",
                    &["r3"],
                    Rhs::Expr(add(sub("a", &["r1"]), sub("a", &["r2"]))),
                ),
            ],
        };
        let analysis = build(&model);
        assert_eq!(Some(&vec![true]), analysis.expansion_flags("_a"));
        assert_eq!("_a[_r1]", analysis.variables.get(0).ref_id);
        assert_eq!("_a[_r2]", analysis.variables.get(1).ref_id);
        assert_eq!("_a[_r3]", analysis.variables.get(2).ref_id);
        // a[r1] and a[r2] are consts, a[r3] references them (pre-pruning
        // they resolved to the two separated records)
        assert_eq!(VarType::Const, analysis.variables.get(0).var_type);
        assert_eq!(VarType::Aux, analysis.variables.get(2).var_type);
    }

    #[test]
    fn test_dimension_ref_expands_over_separated_records() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2"])],
            equations: vec![
                eqn("a", &["r1"], Rhs::Expr(v("t"))),
                eqn("a", &["r2"], Rhs::Expr(v("t"))),
                eqn("t", &[], Rhs::Expr(add(v("Time"), n(0.0)))),
                eqn("b", &["R"], Rhs::Expr(add(sub("a", &["R"]), n(1.0)))),
            ],
        };
        let analysis = build(&model);
        let b = analysis.variables.get(3);
        assert_eq!(
            vec!["_a[_r1]".to_string(), "_a[_r2]".to_string()],
            b.references
        );
    }

    #[test]
    fn test_index_ref_binds_single_record() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2"])],
            equations: vec![
                eqn("a", &["r1"], Rhs::Expr(v("t"))),
                eqn("a", &["r2"], Rhs::Expr(v("t"))),
                eqn("t", &[], Rhs::Expr(v("Time"))),
                eqn("y", &[], Rhs::Expr(sub("a", &["r2"]))),
            ],
        };
        let analysis = build(&model);
        assert_eq!(vec!["_a[_r2]".to_string()], analysis.variables.get(3).references);
    }

    #[test]
    fn test_index_ref_into_apply_to_all() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2"])],
            equations: vec![
                eqn("a", &["R"], Rhs::Expr(v("Time"))),
                eqn("y", &[], Rhs::Expr(sub("a", &["r2"]))),
            ],
        };
        let analysis = build(&model);
        assert_eq!(vec!["_a".to_string()], analysis.variables.get(1).references);
    }

    #[test]
    fn test_dimension_ref_from_scalar_is_mismatch() {
        let model = ParsedModel {
            subscripts: vec![dim("R", &["r1", "r2"])],
            equations: vec![
                eqn("a", &["R"], Rhs::Expr(v("Time"))),
                eqn("y", &[], Rhs::Expr(sub("a", &["R"]))),
            ],
        };
        let err = Analysis::build(
            &model,
            &Spec::default(),
            &ExtData::default(),
            &DirectData::default(),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::SubscriptMismatch, err.code);
    }

    #[test]
    fn test_dangling_reference_errors() {
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![eqn("y", &[], Rhs::Expr(v("nothing")))],
        };
        let err = Analysis::build(
            &model,
            &Spec::default(),
            &ExtData::default(),
            &DirectData::default(),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::DanglingReference, err.code);
        assert!(err.details.unwrap().contains("_nothing"));
    }

    #[test]
    fn test_data_equation_synthesis() {
        let mut ext_data = ExtData::default();
        ext_data.insert("_demand".to_string(), vec![(0.0, 1.0), (10.0, 2.0)]);
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![eqn("y", &[], Rhs::Expr(add(v("demand"), n(1.0))))],
        };
        let analysis = Analysis::build(
            &model,
            &Spec::default(),
            &ext_data,
            &DirectData::default(),
        )
        .unwrap();
        let demand = analysis.variables.get_by_ref_id("_demand").unwrap();
        assert_eq!(VarType::Data, demand.var_type);
        assert_eq!(Some(vec![(0.0, 1.0), (10.0, 2.0)]), demand.points);
        assert!(demand.model_formula.starts_with("WITH LOOKUP(Time"));
        // data references are pruned from evaluation order
        assert!(analysis.variables.get(0).references.is_empty());
    }

    #[test]
    fn test_const_upgrade_fixpoint() {
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![
                eqn("c1", &[], Rhs::Expr(n(5.0))),
                eqn("c2", &[], Rhs::Expr(add(v("c1"), n(1.0)))),
                eqn("c3", &[], Rhs::Expr(add(v("c2"), v("c1")))),
                eqn("y", &[], Rhs::Expr(add(v("c3"), v("Time")))),
            ],
        };
        let analysis = build(&model);
        assert_eq!(VarType::Const, analysis.variables.get(0).var_type);
        assert_eq!(VarType::Const, analysis.variables.get(1).var_type);
        assert_eq!(VarType::Const, analysis.variables.get(2).var_type);
        assert_eq!(VarType::Aux, analysis.variables.get(3).var_type);
        // after pruning, y depends only on time
        assert_eq!(vec!["_time".to_string()], analysis.variables.get(3).references);
    }

    #[test]
    fn test_duplicate_records_error() {
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![
                eqn("x", &[], Rhs::Expr(n(1.0))),
                eqn("x", &[], Rhs::Expr(n(2.0))),
            ],
        };
        let err = Analysis::build(
            &model,
            &Spec::default(),
            &ExtData::default(),
            &DirectData::default(),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::DuplicateVariable, err.code);
    }

    #[test]
    fn test_unknown_spec_var_is_diagnostic_only() {
        let spec = Spec::from_json(r#"{"outputVars": ["y", "zz"]}"#).unwrap();
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![eqn("y", &[], Rhs::Expr(v("Time")))],
        };
        let analysis = Analysis::build(
            &model,
            &spec,
            &ExtData::default(),
            &DirectData::default(),
        )
        .unwrap();
        assert_eq!(1, analysis.diagnostics.len());
        assert_eq!(ErrorCode::UnknownSpecVar, analysis.diagnostics[0].code);
        assert_eq!(Some("zz".to_string()), analysis.diagnostics[0].details);
    }

    #[test]
    fn test_spec_output_var_synthesized_from_data() {
        let spec = Spec::from_json(r#"{"outputVars": ["demand"]}"#).unwrap();
        let mut ext_data = ExtData::default();
        ext_data.insert("_demand".to_string(), vec![(0.0, 1.0)]);
        let model = ParsedModel {
            subscripts: vec![],
            equations: vec![],
        };
        let analysis =
            Analysis::build(&model, &spec, &ext_data, &DirectData::default()).unwrap();
        assert!(analysis.diagnostics.is_empty());
        assert!(analysis.variables.get_by_ref_id("_demand").is_some());
    }
}

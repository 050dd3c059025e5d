// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Diagnostic listings of the analyzed model: one record per variable
//! and per subscript. Plain-text rendering lives here; the records
//! derive `Serialize` so external tooling can emit JSON or YAML.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::analyze::Analysis;
use crate::common::{Result, TIME_VAR};
use crate::model_err;
use crate::subscript::Subscript;

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct VarListing {
    pub var_name: String,
    pub ref_id: String,
    pub var_type: String,
    pub subscripts: Vec<String>,
    pub families: Vec<String>,
    pub has_init_value: bool,
    pub references: Vec<String>,
    pub init_references: Vec<String>,
    pub separation_dims: Vec<String>,
    pub model_lhs: String,
    pub model_formula: String,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct SubListing {
    pub name: String,
    pub kind: String,
    pub family: String,
    pub size: usize,
    /// An index's zero-based position within its family.
    pub position: Option<usize>,
    pub value: Vec<String>,
    pub mappings: BTreeMap<String, Vec<String>>,
}

pub fn var_listings(analysis: &Analysis) -> Vec<VarListing> {
    analysis
        .variables
        .iter()
        .filter(|v| v.var_name != TIME_VAR)
        .map(|v| {
            let families = analysis
                .subscripts
                .subscript_families(&v.subscripts)
                .unwrap_or_default();
            VarListing {
                var_name: v.var_name.clone(),
                ref_id: v.ref_id.clone(),
                var_type: v.var_type.to_string(),
                subscripts: v.subscripts.clone(),
                families,
                has_init_value: v.has_init_value,
                references: v.references.clone(),
                init_references: v.init_references.clone(),
                separation_dims: v.separation_dims.clone(),
                model_lhs: v.model_lhs.clone(),
                model_formula: v.model_formula.clone(),
            }
        })
        .collect()
}

pub fn sub_listings(analysis: &Analysis) -> Vec<SubListing> {
    analysis
        .subscripts
        .iter()
        .map(|s| match s {
            Subscript::Dimension {
                name,
                value,
                family,
                mappings,
            } => SubListing {
                name: name.clone(),
                kind: "dimension".to_string(),
                family: family.clone(),
                size: value.len(),
                position: None,
                value: value.clone(),
                mappings: mappings.clone().into_iter().collect(),
            },
            Subscript::Index {
                name,
                family,
                position,
            } => SubListing {
                name: name.clone(),
                kind: "index".to_string(),
                family: family.clone(),
                size: 1,
                position: Some(*position),
                value: Vec::new(),
                mappings: BTreeMap::new(),
            },
        })
        .collect()
}

pub fn vars_text(analysis: &Analysis) -> String {
    let mut out = String::new();
    for v in var_listings(analysis).iter() {
        let _ = writeln!(out, "{}: {}", v.ref_id, v.var_type);
        if !v.model_lhs.is_empty() {
            let _ = writeln!(out, "  {} = {}", v.model_lhs, v.model_formula);
        }
        if !v.subscripts.is_empty() {
            let _ = writeln!(
                out,
                "  subscripts: {} (families: {})",
                v.subscripts.join(","),
                v.families.join(",")
            );
        }
        if !v.separation_dims.is_empty() {
            let _ = writeln!(out, "  separation dims: {}", v.separation_dims.join(","));
        }
        if !v.references.is_empty() {
            let _ = writeln!(out, "  references: {}", v.references.join(", "));
        }
        if !v.init_references.is_empty() {
            let _ = writeln!(out, "  init references: {}", v.init_references.join(", "));
        }
        let _ = writeln!(out);
    }
    out
}

pub fn subs_text(analysis: &Analysis) -> String {
    let mut out = String::new();
    for s in sub_listings(analysis).iter() {
        if s.kind == "dimension" {
            let _ = writeln!(
                out,
                "{}: dimension (family {}, size {}): {}",
                s.name,
                s.family,
                s.size,
                s.value.join(",")
            );
            for (to, value) in s.mappings.iter() {
                let _ = writeln!(out, "  -> {}: {}", to, value.join(","));
            }
        } else {
            let _ = writeln!(
                out,
                "{}: index {} of {}",
                s.name,
                s.position.unwrap_or_default(),
                s.family
            );
        }
    }
    out
}

pub fn vars_json(analysis: &Analysis) -> Result<String> {
    match serde_json::to_string_pretty(&var_listings(analysis)) {
        Ok(json) => Ok(json),
        Err(err) => model_err!(Generic, err.to_string()),
    }
}

pub fn subs_json(analysis: &Analysis) -> Result<String> {
    match serde_json::to_string_pretty(&sub_listings(analysis)) {
        Ok(json) => Ok(json),
        Err(err) => model_err!(Generic, err.to_string()),
    }
}

// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The I/O specification that accompanies a model: which variables are
//! inputs and outputs, where external data comes from, and overrides for
//! subscript analysis. Parsed from JSON; all fields are optional.

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::{canonicalize, Ident, Result};
use crate::spec_err;

/// External time-series data, keyed by canonical variable name, as read
/// by the (out of scope) dat-file reader.
pub type ExtData = HashMap<Ident, Vec<(f64, f64)>>;

/// Direct-data series keyed by the tag that appears in the model.
pub type DirectData = HashMap<String, Vec<(f64, f64)>>;

/// One entry of `externalDatfiles`: either a bare filename, or a one-key
/// object mapping a variable-name prefix to a filename.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
pub enum DatfileEntry {
    File(String),
    Prefixed(HashMap<String, String>),
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Spec {
    pub input_vars: Vec<String>,
    pub output_vars: Vec<String>,
    pub external_datfiles: Vec<DatfileEntry>,
    pub direct_data: HashMap<String, String>,
    pub dimension_families: HashMap<String, String>,
    pub index_families: HashMap<String, String>,
    pub special_separation_dims: HashMap<String, Vec<String>>,
}

impl Spec {
    pub fn from_json(json: &str) -> Result<Spec> {
        match serde_json::from_str(json) {
            Ok(spec) => Ok(spec),
            Err(err) => spec_err!(BadSpecJson, err.to_string()),
        }
    }

    /// Dimensions that must be separated for the given variable, in
    /// canonical form.
    pub fn separation_dims_for(&self, canonical_var: &str) -> Vec<Ident> {
        for (var, dims) in self.special_separation_dims.iter() {
            if canonicalize(var) == canonical_var {
                return dims.iter().map(|d| canonicalize(d)).collect();
            }
        }
        Vec::new()
    }

    /// Spec-level family override for a dimension, canonicalized.
    pub fn family_override(&self, canonical_dim: &str) -> Option<Ident> {
        self.dimension_families
            .iter()
            .find(|(dim, _)| canonicalize(dim) == canonical_dim)
            .map(|(_, family)| canonicalize(family))
    }

    /// Spec-level family override for an index, canonicalized.
    pub fn index_family_override(&self, canonical_index: &str) -> Option<Ident> {
        self.index_families
            .iter()
            .find(|(index, _)| canonicalize(index) == canonical_index)
            .map(|(_, family)| canonicalize(family))
    }

    pub fn is_direct_data_tag(&self, tag: &str) -> bool {
        self.direct_data.contains_key(tag)
    }
}

/// Split a spec variable reference like `b[R2]` into its canonical base
/// name and canonical subscripts. A bare name yields no subscripts.
pub fn parse_spec_var(name: &str) -> (Ident, Vec<Ident>) {
    match name.split_once('[') {
        Some((base, rest)) => {
            let inner = rest.trim_end().trim_end_matches(']');
            let subscripts = inner
                .split(',')
                .map(canonicalize)
                .filter(|s| s != "_")
                .collect();
            (canonicalize(base), subscripts)
        }
        None => (canonicalize(name), Vec::new()),
    }
}

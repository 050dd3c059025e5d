// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The subscript registry: every dimension and index declared by the
//! model, with families resolved and dimension-to-dimension mappings
//! inverted into storage order.

use std::collections::{BTreeMap, HashSet};

use crate::common::{canonicalize, DimensionName, Ident, IndexName, Result};
use crate::datamodel::SubscriptDef;
use crate::spec::Spec;
use crate::sub_err;

#[derive(Clone, PartialEq, Debug)]
pub enum Subscript {
    Dimension {
        name: DimensionName,
        /// Index names only, after expansion.
        value: Vec<IndexName>,
        family: DimensionName,
        /// Keyed by map-to dimension; after inversion, position `i` holds
        /// the index of this dimension that maps to the i-th index of the
        /// map-to dimension.
        mappings: BTreeMap<DimensionName, Vec<IndexName>>,
    },
    Index {
        name: IndexName,
        family: DimensionName,
        /// Zero-based position within the family dimension.
        position: usize,
    },
}

impl Subscript {
    pub fn name(&self) -> &str {
        match self {
            Subscript::Dimension { name, .. } => name,
            Subscript::Index { name, .. } => name,
        }
    }

    pub fn family(&self) -> &str {
        match self {
            Subscript::Dimension { family, .. } => family,
            Subscript::Index { family, .. } => family,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Subscript::Dimension { value, .. } => value.len(),
            Subscript::Index { .. } => 1,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct SubscriptTable {
    subs: BTreeMap<Ident, Subscript>,
}

impl SubscriptTable {
    /// Ingest the model's subscript-range declarations: canonicalize,
    /// expand nested dimension values, resolve families, instantiate
    /// indices, and invert mappings.
    pub fn build(defs: &[SubscriptDef], spec: &Spec) -> Result<SubscriptTable> {
        let mut raw: BTreeMap<Ident, Vec<Ident>> = BTreeMap::new();
        let mut raw_mappings: BTreeMap<Ident, Vec<(Ident, Vec<Ident>)>> = BTreeMap::new();
        for def in defs.iter() {
            let name = canonicalize(&def.name);
            let elements = def.elements.iter().map(|e| canonicalize(e)).collect();
            let mappings = def
                .mappings
                .iter()
                .map(|m| {
                    (
                        canonicalize(&m.to),
                        m.value.iter().map(|e| canonicalize(e)).collect(),
                    )
                })
                .collect();
            raw_mappings.insert(name.clone(), mappings);
            raw.insert(name, elements);
        }

        let mut table = SubscriptTable::default();
        table.expand_dimensions(&raw)?;
        table.resolve_families(spec);
        table.instantiate_indices(spec);
        table.invert_mappings(&raw_mappings)?;
        Ok(table)
    }

    /// Replace dimension names inside each dimension's value with that
    /// dimension's own value, until only index names remain.
    fn expand_dimensions(&mut self, raw: &BTreeMap<Ident, Vec<Ident>>) -> Result<()> {
        fn expand(
            name: &str,
            raw: &BTreeMap<Ident, Vec<Ident>>,
            visited: &mut HashSet<Ident>,
        ) -> Result<Vec<Ident>> {
            if visited.contains(name) {
                return sub_err!(CyclicDimension, name.to_string());
            }
            visited.insert(name.to_string());

            let mut value = Vec::new();
            for element in raw[name].iter() {
                if raw.contains_key(element) {
                    value.extend(expand(element, raw, visited)?);
                } else {
                    value.push(element.clone());
                }
            }

            visited.remove(name);
            Ok(value)
        }

        for name in raw.keys() {
            let mut visited = HashSet::new();
            let value = expand(name, raw, &mut visited)?;
            self.subs.insert(
                name.clone(),
                Subscript::Dimension {
                    name: name.clone(),
                    value,
                    family: name.clone(),
                    mappings: BTreeMap::new(),
                },
            );
        }
        Ok(())
    }

    /// The family of a dimension is the largest dimension containing its
    /// first index, ties broken by descending name; a spec override wins.
    fn resolve_families(&mut self, spec: &Spec) {
        let dims: Vec<(Ident, Vec<Ident>)> = self
            .subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension { name, value, .. } => Some((name.clone(), value.clone())),
                Subscript::Index { .. } => None,
            })
            .collect();

        let mut families: BTreeMap<Ident, Ident> = BTreeMap::new();
        for (name, value) in dims.iter() {
            if let Some(family) = spec.family_override(name) {
                families.insert(name.clone(), family);
                continue;
            }
            let first = match value.first() {
                Some(first) => first,
                None => continue,
            };
            let mut candidates: Vec<&(Ident, Vec<Ident>)> = dims
                .iter()
                .filter(|(_, v)| v.iter().any(|e| e == first))
                .collect();
            candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(b.0.cmp(&a.0)));
            if let Some((family, _)) = candidates.first() {
                families.insert(name.clone(), family.clone());
            }
        }

        for (name, family) in families.into_iter() {
            if let Some(Subscript::Dimension { family: f, .. }) = self.subs.get_mut(&name) {
                *f = family;
            }
        }
    }

    /// Create one index record per distinct index name, under its family.
    fn instantiate_indices(&mut self, spec: &Spec) {
        let mut dims: Vec<(Ident, Ident, Vec<Ident>)> = self
            .subs
            .values()
            .filter_map(|s| match s {
                Subscript::Dimension {
                    name,
                    family,
                    value,
                    ..
                } => Some((name.clone(), family.clone(), value.clone())),
                Subscript::Index { .. } => None,
            })
            .collect();
        // family dimensions first so indices land at family positions
        dims.sort_by(|a, b| b.2.len().cmp(&a.2.len()).then(a.0.cmp(&b.0)));

        let mut indices: BTreeMap<Ident, Subscript> = BTreeMap::new();
        for (_name, family, value) in dims.iter() {
            let family_value = dims
                .iter()
                .find(|(n, _, _)| n == family)
                .map(|(_, _, v)| v.clone())
                .unwrap_or_else(|| value.clone());
            for (pos, index) in value.iter().enumerate() {
                if indices.contains_key(index) {
                    continue;
                }
                let family = spec
                    .index_family_override(index)
                    .unwrap_or_else(|| family.clone());
                let position = family_value.iter().position(|e| e == index).unwrap_or(pos);
                indices.insert(
                    index.clone(),
                    Subscript::Index {
                        name: index.clone(),
                        family,
                        position,
                    },
                );
            }
        }

        self.subs.extend(indices);
    }

    /// Rewrite each mapping value so that position `i` names the
    /// from-dimension index corresponding to the i-th map-to index. An
    /// empty raw value is the identity mapping.
    fn invert_mappings(
        &mut self,
        raw_mappings: &BTreeMap<Ident, Vec<(Ident, Vec<Ident>)>>,
    ) -> Result<()> {
        let mut inverted: BTreeMap<Ident, BTreeMap<Ident, Vec<Ident>>> = BTreeMap::new();

        for (from, mappings) in raw_mappings.iter() {
            let from_value = match self.subs.get(from) {
                Some(Subscript::Dimension { value, .. }) => value.clone(),
                _ => continue,
            };
            for (to, raw_value) in mappings.iter() {
                let to_value = match self.subs.get(to) {
                    Some(Subscript::Dimension { value, .. }) => value.clone(),
                    _ => {
                        return sub_err!(
                            MappingError,
                            format!("{} -> {}: unknown map-to dimension", from, to)
                        );
                    }
                };

                let value = if raw_value.is_empty() {
                    from_value.clone()
                } else {
                    let mut value: Vec<Option<Ident>> = vec![None; to_value.len()];
                    for (j, entry) in raw_value.iter().enumerate() {
                        let i = match to_value.iter().position(|e| e == entry) {
                            Some(i) => i,
                            None => {
                                return sub_err!(
                                    MappingError,
                                    format!("{} -> {}: unknown map-to index {}", from, to, entry)
                                );
                            }
                        };
                        if j >= from_value.len() {
                            return sub_err!(
                                MappingError,
                                format!("{} -> {}: more entries than indices", from, to)
                            );
                        }
                        value[i] = Some(from_value[j].clone());
                    }
                    let mut filled = Vec::with_capacity(value.len());
                    for (i, v) in value.into_iter().enumerate() {
                        match v {
                            Some(v) => filled.push(v),
                            None => {
                                return sub_err!(
                                    MappingError,
                                    format!("{} -> {}: {} is unmapped", from, to, to_value[i])
                                );
                            }
                        }
                    }
                    filled
                };

                inverted
                    .entry(from.clone())
                    .or_default()
                    .insert(to.clone(), value);
            }
        }

        for (from, mappings) in inverted.into_iter() {
            if let Some(Subscript::Dimension { mappings: m, .. }) = self.subs.get_mut(&from) {
                *m = mappings;
            }
        }
        Ok(())
    }

    pub fn sub(&self, name: &str) -> Option<&Subscript> {
        self.subs.get(name)
    }

    pub fn is_dimension(&self, name: &str) -> bool {
        matches!(self.subs.get(name), Some(Subscript::Dimension { .. }))
    }

    pub fn is_index(&self, name: &str) -> bool {
        matches!(self.subs.get(name), Some(Subscript::Index { .. }))
    }

    pub fn is_subscript(&self, name: &str) -> bool {
        self.subs.contains_key(name)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Subscript> {
        self.subs
            .values()
            .filter(|s| matches!(s, Subscript::Dimension { .. }))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscript> {
        self.subs.values()
    }

    /// The index names a subscript stands for: a dimension's value, or
    /// the index itself.
    pub fn index_names_for_subscript(&self, name: &str) -> Vec<IndexName> {
        match self.subs.get(name) {
            Some(Subscript::Dimension { value, .. }) => value.clone(),
            Some(Subscript::Index { name, .. }) => vec![name.clone()],
            None => Vec::new(),
        }
    }

    pub fn family(&self, name: &str) -> Result<&str> {
        match self.subs.get(name) {
            Some(sub) => Ok(sub.family()),
            None => sub_err!(DoesNotExist, name.to_string()),
        }
    }

    /// Zero-based storage position of an index within its family.
    pub fn index_position(&self, name: &str) -> Result<usize> {
        match self.subs.get(name) {
            Some(Subscript::Index { position, .. }) => Ok(*position),
            _ => sub_err!(DoesNotExist, name.to_string()),
        }
    }

    pub fn family_size(&self, family: &str) -> Result<usize> {
        match self.subs.get(family) {
            Some(Subscript::Dimension { value, .. }) => Ok(value.len()),
            _ => sub_err!(DoesNotExist, family.to_string()),
        }
    }

    /// The inverted mapping value from one dimension onto another, if the
    /// model declared one.
    pub fn mapping(&self, from: &str, to: &str) -> Option<&Vec<IndexName>> {
        match self.subs.get(from) {
            Some(Subscript::Dimension { mappings, .. }) => mappings.get(to),
            _ => None,
        }
    }

    /// Ordered family names for a subscript list.
    pub fn subscript_families(&self, subscripts: &[Ident]) -> Result<Vec<DimensionName>> {
        subscripts
            .iter()
            .map(|s| self.family(s).map(|f| f.to_string()))
            .collect()
    }

    /// Sort a subscript list into normal order: ascending by family name.
    /// Unknown names sort by their own name, so malformed input still
    /// normalizes deterministically and errors surface at resolution.
    pub fn normalize_subscripts(&self, subscripts: &[Ident]) -> Vec<Ident> {
        let mut subscripts = subscripts.to_vec();
        subscripts.sort_by(|a, b| {
            let fa = self.family(a).unwrap_or(a.as_str()).to_string();
            let fb = self.family(b).unwrap_or(b.as_str()).to_string();
            fa.cmp(&fb)
        });
        subscripts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::MappingDef;

    fn def(name: &str, elements: &[&str]) -> SubscriptDef {
        SubscriptDef {
            name: name.to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
            mappings: vec![],
        }
    }

    fn def_mapped(name: &str, elements: &[&str], to: &str, value: &[&str]) -> SubscriptDef {
        SubscriptDef {
            mappings: vec![MappingDef {
                to: to.to_string(),
                value: value.iter().map(|e| e.to_string()).collect(),
            }],
            ..def(name, elements)
        }
    }

    fn build(defs: &[SubscriptDef]) -> SubscriptTable {
        SubscriptTable::build(defs, &Spec::default()).unwrap()
    }

    #[test]
    fn test_expansion() {
        let table = build(&[
            def("DimA", &["DimB", "x4"]),
            def("DimB", &["x1", "DimC"]),
            def("DimC", &["x2", "x3"]),
        ]);
        match table.sub("_dima").unwrap() {
            Subscript::Dimension { value, .. } => {
                assert_eq!(&["_x1", "_x2", "_x3", "_x4"], value.as_slice());
            }
            _ => panic!("expected dimension"),
        }
    }

    #[test]
    fn test_cyclic_expansion_errors() {
        let defs = [def("DimA", &["DimB"]), def("DimB", &["DimA"])];
        let err = SubscriptTable::build(&defs, &Spec::default()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::CyclicDimension, err.code);
    }

    #[test]
    fn test_family_resolution() {
        let table = build(&[
            def("Layers", &["l1", "l2", "l3", "l4"]),
            def("Upper", &["l1", "l2", "l3"]),
            def("Bottom", &["l4"]),
        ]);
        assert_eq!("_layers", table.family("_upper").unwrap());
        assert_eq!("_layers", table.family("_bottom").unwrap());
        assert_eq!("_layers", table.family("_layers").unwrap());
        assert_eq!("_layers", table.family("_l2").unwrap());
        assert_eq!(1, table.index_position("_l2").unwrap());
        // subrange indices keep their family positions
        assert_eq!(3, table.index_position("_l4").unwrap());
    }

    #[test]
    fn test_family_tie_breaks_descending() {
        // equal-size dimensions sharing a first index: larger name wins
        let table = build(&[def("Aa", &["i1", "i2"]), def("Bb", &["i1", "i2"])]);
        assert_eq!("_bb", table.family("_aa").unwrap());
        assert_eq!("_bb", table.family("_bb").unwrap());
    }

    #[test]
    fn test_family_spec_override() {
        let spec = Spec::from_json(r#"{"dimensionFamilies": {"Aa": "Aa"}}"#).unwrap();
        let defs = [def("Aa", &["i1", "i2"]), def("Bb", &["i1", "i2"])];
        let table = SubscriptTable::build(&defs, &spec).unwrap();
        assert_eq!("_aa", table.family("_aa").unwrap());
    }

    #[test]
    fn test_mapping_identity_default() {
        let table = build(&[
            def_mapped("F", &["F1", "F2"], "T", &[]),
            def("T", &["T1", "T2"]),
        ]);
        assert_eq!(
            &vec!["_f1".to_string(), "_f2".to_string()],
            table.mapping("_f", "_t").unwrap()
        );
    }

    #[test]
    fn test_mapping_inversion() {
        // F1 maps to T2 and F2 maps to T1; inverted storage is T-ordered
        let table = build(&[
            def_mapped("F", &["F1", "F2"], "T", &["T2", "T1"]),
            def("T", &["T1", "T2"]),
        ]);
        assert_eq!(
            &vec!["_f2".to_string(), "_f1".to_string()],
            table.mapping("_f", "_t").unwrap()
        );
    }

    #[test]
    fn test_mapping_unknown_index_errors() {
        let defs = [
            def_mapped("F", &["F1", "F2"], "T", &["T9", "T1"]),
            def("T", &["T1", "T2"]),
        ];
        let err = SubscriptTable::build(&defs, &Spec::default()).unwrap_err();
        assert_eq!(crate::common::ErrorCode::MappingError, err.code);
        assert!(err.details.unwrap().contains("_t9"));
    }

    #[test]
    fn test_normalize_subscripts() {
        let table = build(&[def("R", &["r1", "r2"]), def("G", &["g1", "g2"])]);
        let normalized =
            table.normalize_subscripts(&["_r".to_string(), "_g1".to_string()]);
        assert_eq!(&["_g1", "_r"], normalized.as_slice());
        // idempotence
        assert_eq!(normalized, table.normalize_subscripts(&normalized));
    }

    #[test]
    fn test_index_lookups() {
        let table = build(&[def("R", &["r1", "r2", "r3"])]);
        assert!(table.is_dimension("_r"));
        assert!(table.is_index("_r2"));
        assert!(!table.is_subscript("_zz"));
        assert_eq!(3, table.family_size("_r").unwrap());
        assert_eq!(
            vec!["_r1", "_r2", "_r3"],
            table.index_names_for_subscript("_r")
        );
        assert_eq!(vec!["_r2"], table.index_names_for_subscript("_r2"));
    }
}

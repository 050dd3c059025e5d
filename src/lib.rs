// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Analyzer and C code generator for Vensim system dynamics models.
//!
//! The pipeline consumes an already-parsed model (the grammar front-end
//! is a separate concern) together with an I/O spec and external data,
//! builds a typed, subscript-resolved variable table, orders evaluation
//! by topological sort over the reference graphs, and emits a single C
//! translation unit that reproduces the model's semantics.

#![forbid(unsafe_code)]

#[macro_use]
pub mod common;
pub mod ast;
mod builtins;
pub mod codegen;
pub mod datamodel;
pub mod listing;
pub mod spec;
pub mod subscript;
pub mod variable;

mod analyze;
mod equation;
mod sort;

#[cfg(test)]
mod testutils;

pub use self::analyze::Analysis;
pub use self::codegen::{generate, RUNTIME_HEADER};
pub use self::common::{canonicalize, Error, ErrorCode, ErrorKind, Ident, RefId, Result};
pub use self::sort::{aux_ordering, init_ordering, level_ordering};
pub use self::spec::{DirectData, ExtData, Spec};

use self::datamodel::ParsedModel;

/// The result of one end-to-end compilation.
#[derive(Debug)]
pub struct Compiled {
    pub analysis: Analysis,
    pub c_source: String,
}

/// Run the whole pipeline: analyze the parsed model against the spec
/// and external data, then emit C. Spec-var problems are carried as
/// diagnostics on the analysis rather than failing the build.
pub fn compile(
    model: &ParsedModel,
    spec: &Spec,
    ext_data: &ExtData,
    direct_data: &DirectData,
    model_name: &str,
) -> Result<Compiled> {
    let analysis = Analysis::build(model, spec, ext_data, direct_data)?;
    let c_source = codegen::generate(&analysis, spec, model_name)?;
    Ok(Compiled { analysis, c_source })
}

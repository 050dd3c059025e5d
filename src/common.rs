// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

pub type Ident = String;
pub type DimensionName = String;
pub type IndexName = String;
pub type RefId = String;

/// The canonical name of the simulation clock's pseudo-variable.
pub const TIME_VAR: &str = "_time";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    CyclicDimension,
    MappingError,
    SubscriptMismatch,
    DanglingReference,
    DuplicateVariable,
    DependencyCycle,
    UnknownBuiltin,
    BadLookupTable,
    UnknownSpecVar,
    BadSpecJson,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            CyclicDimension => "cyclic_dimension",
            MappingError => "mapping_error",
            SubscriptMismatch => "subscript_mismatch",
            DanglingReference => "dangling_reference",
            DuplicateVariable => "duplicate_variable",
            DependencyCycle => "dependency_cycle",
            UnknownBuiltin => "unknown_builtin",
            BadLookupTable => "bad_lookup_table",
            UnknownSpecVar => "unknown_spec_var",
            BadSpecJson => "bad_spec_json",
            Generic => "generic",
        };

        write!(f, "{}", name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Model,
    Subscript,
    Analysis,
    Spec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Model => "ModelError",
            ErrorKind::Subscript => "SubscriptError",
            ErrorKind::Analysis => "AnalysisError",
            ErrorKind::Spec => "SpecError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! sub_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Subscript, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! analysis_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Analysis, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! spec_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Spec, ErrorCode::$code, Some($str)))
    }}
);

/// Canonicalize a Vensim variable or subscript name: trim, lowercase,
/// collapse runs of non-alphanumeric characters to a single underscore,
/// and prefix a single underscore.
///
/// `canonicalize("Initial Time") == "_initial_time"`.
pub fn canonicalize(name: &str) -> Ident {
    lazy_static! {
        static ref NON_ALNUM_RE: Regex = Regex::new(r"[^a-zA-Z0-9]+").unwrap();
    }

    let name = name.trim();
    let name = NON_ALNUM_RE.replace_all(name, "_");
    let name = name.trim_matches('_');

    format!("_{}", name.to_lowercase())
}

/// True if the name is already in canonical form.
pub fn is_canonical(name: &str) -> bool {
    canonicalize(name) == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!("_time", canonicalize("Time"));
        assert_eq!("_initial_time", canonicalize("Initial Time"));
        assert_eq!("_a_b", canonicalize("a.b"));
        assert_eq!("_a_b", canonicalize("  A   b "));
        assert_eq!("_x", canonicalize("\"x\""));
        assert_eq!("_x27", canonicalize("x27"));
        assert_eq!("_hares_km2", canonicalize("Hares/km2"));
        // already-canonical names are a fixed point
        assert_eq!("_initial_time", canonicalize("_initial_time"));
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical("_a_b"));
        assert!(!is_canonical("A b"));
        assert!(!is_canonical("a"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::Subscript,
            ErrorCode::CyclicDimension,
            Some("_dima".to_string()),
        );
        assert_eq!("SubscriptError{cyclic_dimension: _dima}", err.to_string());
    }
}

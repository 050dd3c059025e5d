// Copyright 2026 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The fixed set of Vensim functions the compiler understands, keyed by
//! canonical name, and their C runtime helper equivalents.

/// Functions that introduce persistent state and classify their variable
/// as a level.
pub fn is_level_fn(name: &str) -> bool {
    matches!(
        name,
        "_integ"
            | "_delay_fixed"
            | "_delay1"
            | "_delay1i"
            | "_delay3"
            | "_delay3i"
            | "_smooth"
            | "_smoothi"
            | "_smooth3"
            | "_smooth3i"
    )
}

pub fn is_builtin_fn(name: &str) -> bool {
    is_level_fn(name)
        || matches!(
            name,
            "_initial"
                | "_with_lookup"
                | "_if_then_else"
                | "_abs"
                | "_min"
                | "_max"
                | "_sqrt"
                | "_exp"
                | "_ln"
                | "_sin"
                | "_cos"
                | "_tan"
                | "_arcsin"
                | "_arccos"
                | "_arctan"
                | "_integer"
                | "_modulo"
                | "_power"
                | "_random_uniform"
        )
}

/// The C runtime helper a simple (stateless, non-level) builtin maps to.
pub fn c_helper(name: &str) -> Option<&'static str> {
    let helper = match name {
        "_if_then_else" => "_IF_THEN_ELSE",
        "_abs" => "_ABS",
        "_min" => "_MIN",
        "_max" => "_MAX",
        "_sqrt" => "_SQRT",
        "_exp" => "_EXP",
        "_ln" => "_LN",
        "_sin" => "_SIN",
        "_cos" => "_COS",
        "_tan" => "_TAN",
        "_arcsin" => "_ARCSIN",
        "_arccos" => "_ARCCOS",
        "_arctan" => "_ARCTAN",
        "_integer" => "_INTEGER",
        "_modulo" => "_MODULO",
        "_random_uniform" => "_RANDOM_UNIFORM",
        "_power" => "pow",
        _ => return None,
    };
    Some(helper)
}

/// The slot-indexed C runtime helper for a level primitive other than
/// `INTEG` (those keep per-slot state across steps).
pub fn c_level_helper(name: &str) -> Option<&'static str> {
    let helper = match name {
        "_delay_fixed" => "_DELAY_FIXED",
        "_delay1" | "_delay1i" => "_DELAY1",
        "_delay3" | "_delay3i" => "_DELAY3",
        "_smooth" | "_smoothi" => "_SMOOTH",
        "_smooth3" | "_smooth3i" => "_SMOOTH3",
        _ => return None,
    };
    Some(helper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin_fn() {
        assert!(is_builtin_fn("_min"));
        assert!(is_builtin_fn("_integ"));
        assert!(is_builtin_fn("_if_then_else"));
        assert!(!is_builtin_fn("_minz"));
        assert!(!is_builtin_fn("_my_lookup"));
    }

    #[test]
    fn test_level_fns_are_builtins() {
        for name in [
            "_integ", "_delay_fixed", "_delay1", "_delay3", "_smooth", "_smooth3",
        ] {
            assert!(is_level_fn(name), "{} should be a level fn", name);
            assert!(is_builtin_fn(name));
        }
        assert!(!is_level_fn("_min"));
    }

    #[test]
    fn test_c_helpers() {
        assert_eq!(Some("_MAX"), c_helper("_max"));
        assert_eq!(Some("pow"), c_helper("_power"));
        assert_eq!(None, c_helper("_integ"));
        assert_eq!(Some("_SMOOTH"), c_level_helper("_smoothi"));
        assert_eq!(None, c_level_helper("_integ"));
    }
}

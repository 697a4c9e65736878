// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use ephys_model::prelude::*;
use ephys_model::{is_valid_identifier, ModelError, Parameter};
use proptest::prelude::*;

#[test]
fn rejects_known_bad_names() {
    for name in ["3x", "", "a$", "a b"] {
        assert!(matches!(Parameter::new(name), Err(ModelError::InvalidName(_))), "{:?}", name);
        assert!(GlobalParameter::new(name, "celsius").is_err());
        assert!(SeclistLocation::of(name).is_err());
        assert!(CellModel::new(name, Arc::new(FileMorphology::new("c.swc")), vec![], vec![]).is_err());
    }
}

proptest! {
    #[test]
    fn identifiers_construct(name in "[A-Za-z_][A-Za-z0-9_]{0,24}") {
        prop_assert!(is_valid_identifier(&name));
        prop_assert!(Parameter::new(name.clone()).is_ok());
        prop_assert!(RangeParameter::new(name.clone(), "cm", vec![]).is_ok());
    }

    #[test]
    fn leading_digit_rejected(name in "[0-9][A-Za-z0-9_]{0,24}") {
        prop_assert!(Parameter::new(name).is_err());
    }

    #[test]
    fn foreign_characters_rejected(
        head in "[A-Za-z_]{1,8}",
        bad in "[ $.\\-+()\\[\\]]",
        tail in "[A-Za-z0-9_]{0,8}",
    ) {
        let name = format!("{}{}{}", head, bad, tail);
        prop_assert!(matches!(Parameter::new(name), Err(ModelError::InvalidName(_))));
    }
}

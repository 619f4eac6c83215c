use std::cmp::Ordering;

use proptest::prelude::*;

use pynix_core::requirement::Requirement;
use pynix_core::version::{filter_versions, Version};

fn operator() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["==", "!=", "<=", ">=", "<", ">", "~=", "==="])
}

fn pep440_text() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(0u64..30, 2..4),
        prop::option::of(prop::sample::select(vec!["a1", "b2", "rc1", ".post1", ".dev3"])),
    )
        .prop_map(|(release, suffix)| {
            let mut text = release
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(".");
            if let Some(s) = suffix {
                text.push_str(s);
            }
            text
        })
}

fn any_version_text() -> impl Strategy<Value = String> {
    prop_oneof![pep440_text(), "[a-z]{1,6}(-[a-z0-9]{1,4})?"]
}

proptest! {
    #[test]
    fn requirement_round_trips(
        name in "[a-z][a-z0-9_]{0,10}",
        op in operator(),
        version in pep440_text(),
    ) {
        let line = format!("{name} {op}{version}");
        let parsed = Requirement::parse(&line).unwrap();
        let reparsed = Requirement::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(reparsed, parsed);
    }

    #[test]
    fn version_ordering_is_total(a in any_version_text(), b in any_version_text()) {
        let (va, vb) = (Version::parse(&a), Version::parse(&b));
        let outcomes = [va < vb, va == vb, va > vb];
        prop_assert_eq!(outcomes.iter().filter(|x| **x).count(), 1);
        prop_assert_eq!(va.cmp(&vb), vb.cmp(&va).reverse());
        if va.cmp(&vb) == Ordering::Equal {
            prop_assert_eq!(va, vb);
        }
    }

    #[test]
    fn filtering_is_idempotent(
        versions in prop::collection::vec(any_version_text(), 0..12),
        op in operator(),
        bound in pep440_text(),
    ) {
        let req = Requirement::parse(&format!("pkg {op}{bound}")).unwrap();
        let parsed: Vec<Version> = versions.iter().map(|v| Version::parse(v)).collect();
        let once: Vec<Version> = filter_versions(&parsed, &req.specs).into_iter().cloned().collect();
        let twice: Vec<Version> = filter_versions(&once, &req.specs).into_iter().cloned().collect();
        prop_assert_eq!(once, twice);
    }
}

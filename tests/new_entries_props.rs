// tests/new_entries_props.rs

use std::collections::BTreeSet;

use flowtrigger::watch::new_entries;
use proptest::prelude::*;

fn names() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("run[0-9]{1,3}", 0..20)
}

proptest! {
    #[test]
    fn new_entries_is_symmetric_difference_present_in_current(
        seen in names(),
        current in names(),
    ) {
        let fresh = new_entries(&seen, &current);

        let expected: BTreeSet<String> = seen
            .symmetric_difference(&current)
            .filter(|n| current.contains(*n))
            .cloned()
            .collect();
        prop_assert_eq!(&fresh, &expected);
        prop_assert!(fresh.is_disjoint(&seen));
    }

    #[test]
    fn unchanged_listing_yields_nothing(seen in names()) {
        prop_assert!(new_entries(&seen, &seen).is_empty());
    }
}

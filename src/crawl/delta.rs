use std::collections::HashSet;

/// Urls in `discovered` that are not already in `persisted`.
///
/// Keeps the discovered order, though nothing downstream relies on it.
pub fn delta(discovered: Vec<String>, persisted: &HashSet<String>) -> Vec<String> {
    discovered
        .into_iter()
        .filter(|url| !persisted.contains(url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drops_known_urls() {
        let persisted: HashSet<String> = ["https://x/1".to_string()].into();
        let fresh = delta(vec!["https://x/1".into(), "https://x/2".into()], &persisted);
        assert_eq!(fresh, vec!["https://x/2".to_string()]);
    }

    proptest! {
        #[test]
        fn delta_is_set_difference(
            discovered in proptest::collection::hash_set("[a-e]{1,3}", 0..30),
            persisted in proptest::collection::hash_set("[a-e]{1,3}", 0..30),
        ) {
            let result: HashSet<String> =
                delta(discovered.iter().cloned().collect(), &persisted).into_iter().collect();
            let expected: HashSet<String> = discovered.difference(&persisted).cloned().collect();

            prop_assert_eq!(&result, &expected);
            prop_assert!(result.is_disjoint(&persisted));
        }
    }
}

// Copyright 2025 Oxide Computer Company

/// Key-set comparison of two keyed collections.
///
/// `a_unique` and `common` preserve `a`'s iteration order; `b_unique`
/// preserves `b`'s. Diff output built from these is therefore stable for a
/// given pair of inputs.
#[derive(Debug)]
pub(crate) struct SetCompare<K, V> {
    pub a_unique: Vec<(K, V)>,
    pub common: Vec<(K, (V, V))>,
    pub b_unique: Vec<(K, V)>,
}

impl<K, V> SetCompare<K, V>
where
    K: PartialEq,
{
    pub fn new<I, I2>(a: I, b: I2) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I2: IntoIterator<Item = (K, V)>,
    {
        let mut b_entries: Vec<(K, Option<V>)> =
            b.into_iter().map(|(k, v)| (k, Some(v))).collect();

        let mut a_unique = Vec::new();
        let mut common = Vec::new();

        for (ak, av) in a {
            match b_entries
                .iter_mut()
                .find(|(bk, bv)| bv.is_some() && *bk == ak)
            {
                Some((_, bv)) => {
                    let bv = bv.take().unwrap();
                    common.push((ak, (av, bv)));
                }
                None => a_unique.push((ak, av)),
            }
        }

        let b_unique = b_entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();

        Self {
            a_unique,
            common,
            b_unique,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SetCompare;

    #[test]
    fn test_cmp() {
        let a = [(1, "a"), (2, "b")];
        let b = [(1, "aa"), (3, "c")];

        let cmp = SetCompare::new(a, b);

        assert_eq!(cmp.a_unique, vec![(2, "b")]);
        assert_eq!(cmp.common, vec![(1, ("a", "aa"))]);
        assert_eq!(cmp.b_unique, vec![(3, "c")]);
    }

    #[test]
    fn preserves_insertion_order() {
        let a = [("z", 1), ("m", 2), ("a", 3)];
        let b = [("a", 30), ("q", 40), ("z", 10)];

        let cmp = SetCompare::new(a, b);

        // Common keys come out in a's order, not sorted.
        let common_keys: Vec<_> = cmp.common.iter().map(|(k, _)| *k).collect();
        assert_eq!(common_keys, vec!["z", "a"]);
        assert_eq!(cmp.a_unique, vec![("m", 2)]);
        assert_eq!(cmp.b_unique, vec![("q", 40)]);
    }
}

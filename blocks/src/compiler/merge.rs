use crate::error::{CssBlocksError, Result};
use crate::selector::{Combinator, CompoundSelector, ParsedSelector};

/// Combine two selectors so the result selects elements matched by both
/// key compounds.
///
/// The merged key holds `other`'s nodes then `current`'s. When only one side
/// has context it is kept as is. When both do, each may have exactly one
/// combinator; the contexts are then interleaved in every order the
/// combinators allow, which can take up to three selectors.
pub fn merge_key_selectors(other: &ParsedSelector, current: &ParsedSelector) -> Result<Vec<ParsedSelector>> {
    let key = other.key().merged(current.key());

    let (other_context, current_context) = match (other.split_last(), current.split_last()) {
        (None, None) => return Ok(vec![ParsedSelector::new(key)]),
        (Some((context, combinator)), None) | (None, Some((context, combinator))) => {
            return Ok(vec![context.then(combinator, key)]);
        }
        (Some(other_context), Some(current_context)) => (other_context, current_context),
    };

    let ((a, c1), (b, c2)) = (other_context, current_context);
    if a.combinator_count() > 0 || b.combinator_count() > 0 {
        return Err(CssBlocksError::block(format!(
            "Cannot merge selectors with more than one combinator: `{}` and `{}`",
            other, current
        )));
    }
    let a = a.key().clone();
    let b = b.key().clone();
    let both = a.merged(&b);

    let selectors = if c1 == c2 && c1.is_contiguous() {
        vec![chain(&[(both, c1)], key)]
    } else if c1 == c2 {
        vec![
            chain(&[(a.clone(), c1), (b.clone(), c1)], key.clone()),
            chain(&[(b, c1), (a, c1)], key.clone()),
            chain(&[(both, c1)], key),
        ]
    } else if c1.is_hierarchical() != c2.is_hierarchical() {
        let (outer, inner) = if c1.is_hierarchical() {
            ((a, c1), (b, c2))
        } else {
            ((b, c2), (a, c1))
        };
        vec![chain(&[outer, inner], key)]
    } else {
        // Same direction, one contiguous: `>` with ` `, or `+` with `~`.
        let (loose, tight) = if c1.is_contiguous() {
            ((b, c2), (a, c1))
        } else {
            ((a, c1), (b, c2))
        };
        let tight_combinator = tight.1;
        vec![
            chain(&[loose, tight], key.clone()),
            chain(&[(both, tight_combinator)], key),
        ]
    };
    Ok(selectors)
}

/// `compound combinator compound combinator ... key`.
fn chain(context: &[(CompoundSelector, Combinator)], key: CompoundSelector) -> ParsedSelector {
    let mut links = context.iter();
    let Some((head, mut combinator)) = links.next().cloned() else {
        return ParsedSelector::new(key);
    };
    let mut selector = ParsedSelector::new(head);
    for (compound, next) in links {
        selector.push(combinator, compound.clone());
        combinator = *next;
    }
    selector.then(combinator, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{parse_selectors, selector_list};

    fn merge(other: &str, current: &str) -> Result<String> {
        let other = parse_selectors(other).expect("valid selector").remove(0);
        let current = parse_selectors(current).expect("valid selector").remove(0);
        merge_key_selectors(&other, &current).map(|merged| selector_list(&merged))
    }

    #[test]
    fn keys_without_context() {
        assert_eq!(merge(".a", ".b").unwrap(), ".a.b");
    }

    #[test]
    fn one_context_is_kept() {
        assert_eq!(merge(".x .a", ".b").unwrap(), ".x .a.b");
        assert_eq!(merge(".a", ".y > .b").unwrap(), ".y > .a.b");
    }

    #[test]
    fn same_contiguous_combinator_merges_contexts() {
        assert_eq!(merge(".x > .a", ".y > .b").unwrap(), ".x.y > .a.b");
        assert_eq!(merge(".x + .a", ".y + .b").unwrap(), ".x.y + .a.b");
    }

    #[test]
    fn same_loose_combinator_gives_three_orders() {
        assert_eq!(
            merge(".x .a", ".y .b").unwrap(),
            ".x .y .a.b, .y .x .a.b, .x.y .a.b"
        );
        assert_eq!(
            merge(".x ~ .a", ".y ~ .b").unwrap(),
            ".x ~ .y ~ .a.b, .y ~ .x ~ .a.b, .x.y ~ .a.b"
        );
    }

    #[test]
    fn hierarchy_wraps_siblings() {
        assert_eq!(merge(".x + .a", ".y > .b").unwrap(), ".y > .x + .a.b");
        assert_eq!(merge(".x .a", ".y ~ .b").unwrap(), ".x .y ~ .a.b");
    }

    #[test]
    fn loose_and_tight_give_two_options() {
        assert_eq!(merge(".x > .a", ".y .b").unwrap(), ".y .x > .a.b, .x.y > .a.b");
        assert_eq!(merge(".x ~ .a", ".y + .b").unwrap(), ".x ~ .y + .a.b, .x.y + .a.b");
    }

    #[test]
    fn longer_chains_are_rejected() {
        let err = merge(".w .x .a", ".y .b").unwrap_err();
        assert!(err.to_string().contains("Cannot merge"), "{}", err);
    }
}

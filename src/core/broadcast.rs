//! Broadcasting of mixed scalar/list fields into elementary transfers.
//!
//! One-element lists are treated as scalars. The remaining lists must all
//! have the same length `n`; scalars are repeated `n` times and the three
//! fields are zipped in order. With no lists, exactly one transfer results.

use super::error::RecipeError;
use super::types::{ElementaryTransfer, Field};
use std::collections::BTreeSet;

/// Expand `(volume, source, destination)` into an ordered list of transfers.
pub fn broadcast<L: Clone>(
    volume: Field<u32>,
    source: Field<L>,
    destination: Field<L>,
) -> Result<Vec<ElementaryTransfer<L>>, RecipeError> {
    let volume = collapse(volume);
    let source = collapse(source);
    let destination = collapse(destination);

    let lengths: BTreeSet<usize> = [
        list_len(&volume),
        list_len(&source),
        list_len(&destination),
    ]
    .into_iter()
    .flatten()
    .collect();

    let n = match lengths.len() {
        0 => 1,
        1 => lengths.into_iter().next().unwrap_or(1),
        _ => {
            return Err(RecipeError::AmbiguousBroadcastDimension {
                volume_len: volume.len(),
                source_len: source.len(),
                destination_len: destination.len(),
            })
        }
    };

    let transfers = spread(volume, n)
        .into_iter()
        .zip(spread(source, n))
        .zip(spread(destination, n))
        .map(|((volume, source), destination)| ElementaryTransfer {
            volume,
            source,
            destination,
        })
        .collect();
    Ok(transfers)
}

/// A one-element list is a scalar.
fn collapse<T>(field: Field<T>) -> Field<T> {
    match field {
        Field::List(mut values) if values.len() == 1 => match values.pop() {
            Some(v) => Field::Scalar(v),
            None => Field::List(values),
        },
        other => other,
    }
}

fn list_len<T>(field: &Field<T>) -> Option<usize> {
    match field {
        Field::Scalar(_) => None,
        Field::List(values) => Some(values.len()),
    }
}

fn spread<T: Clone>(field: Field<T>, n: usize) -> Vec<T> {
    match field {
        Field::Scalar(v) => vec![v; n],
        Field::List(values) => values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(v: &str) -> Field<String> {
        Field::Scalar(v.to_string())
    }

    fn l(vs: &[&str]) -> Field<String> {
        Field::List(vs.iter().map(|v| v.to_string()).collect())
    }

    fn triples(ts: &[ElementaryTransfer]) -> Vec<(u32, &str, &str)> {
        ts.iter()
            .map(|t| (t.volume, t.source.as_str(), t.destination.as_str()))
            .collect()
    }

    #[test]
    fn test_broadcast_all_scalar() {
        let ts = broadcast(Field::Scalar(10), s("A:A1"), s("B:B1")).unwrap();
        assert_eq!(triples(&ts), vec![(10, "A:A1", "B:B1")]);
    }

    #[test]
    fn test_broadcast_equal_length_lists() {
        let ts = broadcast(
            Field::List(vec![50, 100, 75]),
            l(&["A:A1", "A:A2", "A:A3"]),
            s("B:C1"),
        )
        .unwrap();
        assert_eq!(
            triples(&ts),
            vec![
                (50, "A:A1", "B:C1"),
                (100, "A:A2", "B:C1"),
                (75, "A:A3", "B:C1"),
            ]
        );
    }

    #[test]
    fn test_broadcast_singleton_collapse() {
        let ts = broadcast(Field::List(vec![50]), l(&["A:A1", "A:A2"]), s("B:B1")).unwrap();
        assert_eq!(
            triples(&ts),
            vec![(50, "A:A1", "B:B1"), (50, "A:A2", "B:B1")]
        );
    }

    #[test]
    fn test_broadcast_singleton_collapse_any_position() {
        let ts = broadcast(Field::List(vec![5, 6, 7]), l(&["A:A1"]), l(&["B:B1", "B:B2", "B:B3"]))
            .unwrap();
        assert_eq!(ts.len(), 3);
        assert!(ts.iter().all(|t| t.source == "A:A1"));
    }

    #[test]
    fn test_broadcast_ambiguous_lengths() {
        let err = broadcast(Field::Scalar(10), l(&["A:A1", "A:A2"]), l(&["B:B1", "B:B2", "B:B3"]))
            .unwrap_err();
        assert_eq!(
            err,
            RecipeError::AmbiguousBroadcastDimension {
                volume_len: 1,
                source_len: 2,
                destination_len: 3
            }
        );
    }

    #[test]
    fn test_broadcast_ambiguous_volume_list() {
        let err = broadcast(Field::List(vec![1, 2, 3]), l(&["A:A1", "A:A2"]), s("B:B1"));
        assert!(err.is_err());
    }

    #[test]
    fn test_broadcast_empty_list_yields_nothing() {
        let ts = broadcast(Field::Scalar(10), l(&[]), s("B:B1")).unwrap();
        assert!(ts.is_empty());
    }

    proptest! {
        /// Property: a single list of length n drives n transfers in order,
        /// with the scalars repeated.
        #[test]
        fn prop_single_list_broadcast(
            volume in 1u32..1000,
            sources in proptest::collection::vec("[A-H][1-9]", 2..24),
            which in 0usize..3,
        ) {
            let n = sources.len();
            let volumes: Vec<u32> = (0..n as u32).map(|i| volume + i).collect();
            let src = || Field::Scalar("src".to_string());
            let dst = || Field::Scalar("dst".to_string());
            let (vol_field, src_field, dst_field) = match which {
                0 => (Field::List(volumes.clone()), src(), dst()),
                1 => (Field::Scalar(volume), Field::List(sources.clone()), dst()),
                _ => (Field::Scalar(volume), src(), Field::List(sources.clone())),
            };
            let ts = broadcast(vol_field, src_field, dst_field).unwrap();
            prop_assert_eq!(ts.len(), n);
            for (i, t) in ts.iter().enumerate() {
                match which {
                    0 => {
                        prop_assert_eq!(t.volume, volumes[i]);
                        prop_assert_eq!(t.source.as_str(), "src");
                        prop_assert_eq!(t.destination.as_str(), "dst");
                    }
                    1 => {
                        prop_assert_eq!(t.volume, volume);
                        prop_assert_eq!(&t.source, &sources[i]);
                        prop_assert_eq!(t.destination.as_str(), "dst");
                    }
                    _ => {
                        prop_assert_eq!(t.volume, volume);
                        prop_assert_eq!(t.source.as_str(), "src");
                        prop_assert_eq!(&t.destination, &sources[i]);
                    }
                }
            }
        }

        /// Property: lists of two different lengths > 1 are always rejected.
        #[test]
        fn prop_unequal_lists_rejected(a in 2usize..10, b in 2usize..10) {
            prop_assume!(a != b);
            let src: Vec<String> = (0..a).map(|i| format!("A{}", i + 1)).collect();
            let dst: Vec<String> = (0..b).map(|i| format!("B{}", i + 1)).collect();
            let result = broadcast(Field::Scalar(10), Field::List(src), Field::List(dst));
            prop_assert!(
                matches!(result, Err(RecipeError::AmbiguousBroadcastDimension { .. })),
                "expected ambiguous dimension error"
            );
        }
    }
}

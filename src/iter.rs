//! Iterator extension methods.

use std::iter::Zip;

/// A variant of [`Iterator::zip`] that panics if the iterators have different lengths.
///
/// [`Iterator::zip`] silently stops at the shorter iterator, which hides bugs when copying tensor
/// data into fixed-size landmark buffers.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "`zip_exact` called on iterators with different lengths"
    );

    a.zip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_equal_lengths() {
        let pairs = zip_exact([1, 2, 3], ['a', 'b', 'c']).collect::<Vec<_>>();
        assert_eq!(pairs, [(1, 'a'), (2, 'b'), (3, 'c')]);
    }

    #[test]
    #[should_panic(expected = "different lengths")]
    fn panics_on_length_mismatch() {
        zip_exact([1, 2], [1]).for_each(drop);
    }
}

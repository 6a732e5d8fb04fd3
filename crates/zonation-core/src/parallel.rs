//! Row-parallel helpers gated on the `threading` feature.
//!
//! Both paths produce identical output; rayon only changes scheduling.

/// Map `f` over `0..n` and collect in index order.
#[cfg(feature = "threading")]
pub(crate) fn map_indices<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    use rayon::prelude::*;
    (0..n).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "threading"))]
pub(crate) fn map_indices<T, F>(n: usize, f: F) -> Vec<T>
where
    F: Fn(usize) -> T,
{
    (0..n).map(f).collect()
}

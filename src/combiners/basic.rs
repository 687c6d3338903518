use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

use super::CombineFn;

/* ===================== MaxF64 ===================== */

/// Maximum of `f64` values; missing and NaN inputs never win.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxF64;

impl CombineFn<f64, Option<f64>, Option<f64>> for MaxF64 {
    fn create(&self) -> Option<f64> {
        None
    }

    fn add_input(&self, acc: &mut Option<f64>, v: f64) {
        if v.is_nan() {
            return;
        }
        match acc {
            Some(cur) => {
                if v > *cur {
                    *cur = v;
                }
            }
            None => *acc = Some(v),
        }
    }

    fn merge(&self, acc: &mut Option<f64>, other: Option<f64>) {
        if let Some(v) = other {
            self.add_input(acc, v);
        }
    }

    fn finish(&self, acc: Option<f64>) -> Option<f64> {
        acc
    }
}

/* ===================== FirstValue<T> ===================== */

/// Keeps the first value offered; later values (and later merges) are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstValue<T>(PhantomData<T>);

impl<T> FirstValue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Send + Sync> CombineFn<T, Option<T>, Option<T>> for FirstValue<T> {
    fn create(&self) -> Option<T> {
        None
    }

    fn add_input(&self, acc: &mut Option<T>, v: T) {
        if acc.is_none() {
            *acc = Some(v);
        }
    }

    fn merge(&self, acc: &mut Option<T>, other: Option<T>) {
        if acc.is_none() {
            *acc = other;
        }
    }

    fn finish(&self, acc: Option<T>) -> Option<T> {
        acc
    }
}

/// Fold a keyed map of accumulators into `into` using `comb.merge`.
pub fn merge_keyed<K, V, A, O, C>(comb: &C, into: &mut HashMap<K, A>, other: HashMap<K, A>)
where
    K: Eq + Hash,
    C: CombineFn<V, A, O>,
{
    for (k, a) in other {
        match into.get_mut(&k) {
            Some(cur) => comb.merge(cur, a),
            None => {
                into.insert(k, a);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_ignores_nan_and_merges() {
        let m = MaxF64;
        let mut a = m.create();
        m.add_input(&mut a, 3.0);
        m.add_input(&mut a, f64::NAN);
        let mut b = m.create();
        m.add_input(&mut b, 7.0);
        m.merge(&mut a, b);
        m.merge(&mut a, None);
        assert_eq!(m.finish(a), Some(7.0));
    }

    #[test]
    fn first_value_wins() {
        let f = FirstValue::<&str>::new();
        let mut a = f.create();
        f.add_input(&mut a, "x");
        f.add_input(&mut a, "y");
        f.merge(&mut a, Some("z"));
        assert_eq!(f.finish(a), Some("x"));
    }

    #[test]
    fn keyed_merge_is_order_free() {
        let m = MaxF64;
        let left: HashMap<&str, Option<f64>> = [("a", Some(1.0)), ("b", Some(5.0))].into();
        let right: HashMap<&str, Option<f64>> = [("a", Some(4.0)), ("c", Some(2.0))].into();

        let mut lr = left.clone();
        merge_keyed(&m, &mut lr, right.clone());
        let mut rl = right;
        merge_keyed(&m, &mut rl, left);
        assert_eq!(lr, rl);
        assert_eq!(lr["a"], Some(4.0));
    }
}

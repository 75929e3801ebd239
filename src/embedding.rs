use std::path::{Component, Path};

use ndarray::{Array1, ArrayView1};

use crate::error::{Error, Result};

/// Identity label naming one reference person.
pub type Label = String;

/// Checks that `label` is usable as one folder name: a single normal path
/// component, so it cannot be empty, absolute, `.`/`..` or contain a separator.
pub fn check_label(label: &str) -> Result<()> {
    let mut components = Path::new(label).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == label => Ok(()),
        _ => Err(Error::InvalidLabel(label.to_string())),
    }
}

/// A face embedding produced by the recognition model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vector: Array1<f32>,
}

impl Embedding {
    /// Wraps a raw model output. Empty and non-finite vectors are rejected.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::EmptyEmbedding);
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteEmbedding(idx));
        }
        Ok(Self {
            vector: Array1::from(values),
        })
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.vector.view()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }

    /// L2 norm, accumulated in `f64` so that no finite input overflows or
    /// underflows to zero.
    pub fn norm(&self) -> f64 {
        dot(self.view(), self.view()).sqrt()
    }
}

/// Dot product of two equally long vectors, accumulated in `f64`.
pub(crate) fn dot(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = Error;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_non_finite() {
        assert_eq!(Embedding::new(vec![]), Err(Error::EmptyEmbedding));
        assert_eq!(
            Embedding::new(vec![0.1, f32::NAN, 0.3]),
            Err(Error::NonFiniteEmbedding(1))
        );
        assert_eq!(
            Embedding::new(vec![f32::INFINITY]),
            Err(Error::NonFiniteEmbedding(0))
        );
    }

    #[test]
    fn norm_and_dim() {
        let e = Embedding::new(vec![3.0, 4.0]).unwrap();
        assert_eq!(e.dim(), 2);
        assert!((e.norm() - 5.0).abs() < 1e-6);
        assert_eq!(e.to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn labels_must_be_one_folder_name() {
        for ok in ["alice", "Bob Smith", "carol.v2", "..hidden"] {
            assert_eq!(check_label(ok), Ok(()), "{ok}");
        }
        for bad in ["", "/etc", "..", ".", "../escape", "a/b", "alice/", "./alice"] {
            assert_eq!(check_label(bad), Err(Error::InvalidLabel(bad.to_string())), "{bad}");
        }
    }

    #[test]
    fn norm_of_extreme_magnitudes() {
        let big = Embedding::new(vec![3e30, 4e30]).unwrap();
        assert!((big.norm() / 5e30 - 1.0).abs() < 1e-6);
        let tiny = Embedding::new(vec![3e-30, 4e-30]).unwrap();
        assert!(tiny.norm() > 0.0);
        assert!((tiny.norm() / 5e-30 - 1.0).abs() < 1e-6);
    }
}

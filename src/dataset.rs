//! In-memory datasets of `(features, labels)` entries.
//!
//! Entries are reference counted, so sampling a batch or splitting a dataset
//! never copies matrices: both sides share the same [`Entry`] values.

use crate::Matrix;
use crate::error::{Error, Result};
use core::ops::Index;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// One sample: a `1 × feature_count` row and a `1 × label_count` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Input row.
    pub features: Matrix,
    /// Expected output row.
    pub labels: Matrix,
}

impl Entry {
    /// Creates an entry from two single-row matrices.
    ///
    /// # Errors
    ///
    /// Fails if either matrix has more than one row.
    pub fn new(features: Matrix, labels: Matrix) -> Result<Self> {
        if features.rows() != 1 || labels.rows() != 1 {
            return Err(Error::precondition(
                "dataset::entry",
                format!(
                    "features are {}x{} and labels {}x{}, both must be single rows",
                    features.rows(),
                    features.cols(),
                    labels.rows(),
                    labels.cols()
                ),
            ));
        }
        Ok(Self { features, labels })
    }

    /// Shorthand for [`Entry::new`] over plain slices.
    ///
    /// # Errors
    ///
    /// Never fails for slices; kept fallible for symmetry with [`Entry::new`].
    pub fn from_slices(features: &[f32], labels: &[f32]) -> Result<Self> {
        Self::new(
            Matrix::from_values(features, 1, features.len())?,
            Matrix::from_values(labels, 1, labels.len())?,
        )
    }
}

fn deref_entry(entry: &Arc<Entry>) -> &Entry {
    entry
}

/// An ordered collection of entries with uniform shapes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    entries: Vec<Arc<Entry>>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds a dataset, checking every entry against the first.
    ///
    /// # Errors
    ///
    /// Fails if entries disagree on their feature or label width.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self> {
        let mut data = Self::new();
        for entry in entries {
            data.add_entry(Arc::new(entry))?;
        }
        Ok(data)
    }

    /// Appends a `(features, labels)` pair.
    ///
    /// # Errors
    ///
    /// Fails if the pair is not made of single rows, or its widths differ
    /// from the entries already present.
    pub fn add(&mut self, features: Matrix, labels: Matrix) -> Result<()> {
        self.add_entry(Arc::new(Entry::new(features, labels)?))
    }

    /// Appends a shared entry.
    ///
    /// # Errors
    ///
    /// Fails if its widths differ from the entries already present.
    pub fn add_entry(&mut self, entry: Arc<Entry>) -> Result<()> {
        if let Some(first) = self.entries.first() {
            let expected = (first.features.cols(), first.labels.cols());
            let got = (entry.features.cols(), entry.labels.cols());
            if expected != got {
                return Err(Error::precondition(
                    "dataset::add",
                    format!(
                        "entry has {} features and {} labels, dataset has {} and {}",
                        got.0, got.1, expected.0, expected.1
                    ),
                ));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dataset has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `i`-th entry, if any.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&Entry> {
        self.entries.get(i).map(deref_entry)
    }

    /// All entries, in order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Entry> + '_ {
        self.entries.iter().map(deref_entry)
    }

    /// Width of the feature rows, `None` when empty.
    #[must_use]
    pub fn feature_count(&self) -> Option<usize> {
        self.entries.first().map(|e| e.features.cols())
    }

    /// Width of the label rows, `None` when empty.
    #[must_use]
    pub fn label_count(&self) -> Option<usize> {
        self.entries.first().map(|e| e.labels.cols())
    }

    /// Every feature row stacked into a `len × feature_count` matrix.
    ///
    /// # Errors
    ///
    /// Only fails if the entries are inconsistent, which `add` prevents.
    pub fn features(&self) -> Result<Matrix> {
        Ok(Matrix::vstack(self.iter().map(|e| &e.features))?.with_id("dataset::features"))
    }

    /// Every label row stacked into a `len × label_count` matrix.
    ///
    /// # Errors
    ///
    /// Only fails if the entries are inconsistent, which `add` prevents.
    pub fn labels(&self) -> Result<Matrix> {
        Ok(Matrix::vstack(self.iter().map(|e| &e.labels))?.with_id("dataset::labels"))
    }

    /// A uniformly random shuffle of `[0, len)`.
    fn permutation<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        indices
    }

    fn pick(&self, indices: &[usize]) -> Self {
        Self {
            entries: indices.iter().map(|&i| Arc::clone(&self.entries[i])).collect(),
        }
    }

    /// Samples `batch_size` distinct entries, using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Fails unless `1 <= batch_size <= len`.
    pub fn get_random_batch(&self, batch_size: usize) -> Result<Self> {
        self.get_random_batch_with(&mut rand::rng(), batch_size)
    }

    /// Samples `batch_size` distinct entries: the first `batch_size` indices
    /// of a fresh permutation of the whole dataset.
    ///
    /// # Errors
    ///
    /// Fails unless `1 <= batch_size <= len`.
    pub fn get_random_batch_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 || batch_size > self.len() {
            return Err(Error::precondition(
                "dataset::get_random_batch",
                format!("invalid batch_size {batch_size} for {} entries", self.len()),
            ));
        }
        let indices = self.permutation(rng);
        Ok(self.pick(&indices[..batch_size]))
    }

    /// Randomly splits into `(train, test)`, using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// See [`Dataset::train_test_split_with`].
    pub fn train_test_split(&self, train_ratio: f64) -> Result<(Self, Self)> {
        self.train_test_split_with(&mut rand::rng(), train_ratio)
    }

    /// Randomly splits into `(train, test)`, where `train` holds
    /// `floor(len × train_ratio)` entries and `test` the rest.
    ///
    /// # Errors
    ///
    /// Fails unless `0 < train_ratio < 1` and the dataset has at least two
    /// entries.
    pub fn train_test_split_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        train_ratio: f64,
    ) -> Result<(Self, Self)> {
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(Error::precondition(
                "dataset::train_test_split",
                format!("invalid train ratio {train_ratio}"),
            ));
        }
        if self.len() < 2 {
            return Err(Error::precondition(
                "dataset::train_test_split",
                format!("dataset is too small ({} entries)", self.len()),
            ));
        }

        #[allow(clippy::cast_sign_loss)]
        let train_size = (self.len() as f64 * train_ratio).floor() as usize;
        let indices = self.permutation(rng);
        let (train, test) = indices.split_at(train_size);
        log::debug!(
            target: "gridnet::dataset",
            "split {} entries into {} train / {} test",
            self.len(),
            train.len(),
            test.len()
        );
        Ok((self.pick(train), self.pick(test)))
    }
}

impl Index<usize> for Dataset {
    type Output = Entry;

    fn index(&self, i: usize) -> &Entry {
        &self.entries[i]
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Entry;
    type IntoIter = core::iter::Map<core::slice::Iter<'a, Arc<Entry>>, fn(&Arc<Entry>) -> &Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(deref_entry as fn(&Arc<Entry>) -> &Entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix;

    fn tiny() -> Dataset {
        Dataset::from_entries((0..4u8).map(|i| {
            let x = f32::from(i);
            Entry::from_slices(&[x, x], &[2.0 * x]).unwrap()
        }))
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_widths() {
        let mut data = tiny();
        let err = data.add(matrix![[1, 2, 3]], matrix![[1]]).unwrap_err();
        assert!(err.is_precondition());
        assert!(data.add(matrix![[1], [2]], matrix![[1]]).is_err());
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn stacks_features_and_labels() {
        let data = tiny();
        assert_eq!(
            data.features().unwrap(),
            matrix![[0, 0], [1, 1], [2, 2], [3, 3]]
        );
        assert_eq!(data.labels().unwrap(), matrix![[0], [2], [4], [6]]);
        assert_eq!(data.feature_count(), Some(2));
        assert_eq!(data.label_count(), Some(1));
    }

    #[test]
    fn batch_shares_entries() {
        let data = tiny();
        let batch = data.get_random_batch(4).unwrap();
        for e in batch.entries() {
            assert!(data.entries().iter().any(|d| Arc::ptr_eq(d, e)));
        }
    }

    #[test]
    fn zero_batch_is_fatal() {
        assert!(tiny().get_random_batch(0).is_err());
    }

    #[test]
    fn split_rejects_bounds() {
        let data = tiny();
        assert!(data.train_test_split(0.0).is_err());
        assert!(data.train_test_split(1.0).is_err());
        assert!(data.train_test_split(f64::NAN).is_err());
        let single = Dataset::from_entries([Entry::from_slices(&[1.0], &[1.0]).unwrap()]).unwrap();
        assert!(single.train_test_split(0.5).is_err());
    }
}

use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::metadata::ClassToIdx;

/// One mini-batch: a row per sample plus its class index.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Matrix,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn new(inputs: Matrix, labels: Vec<usize>) -> Result<Batch> {
        if inputs.rows != labels.len() {
            return Err(Error::Dataset(format!(
                "batch has {} inputs but {} labels",
                inputs.rows,
                labels.len()
            )));
        }
        if !inputs.is_rectangular() {
            return Err(Error::BatchProcessingFailure(format!(
                "batch rows must all hold {} values",
                inputs.cols
            )));
        }
        Ok(Batch { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A collection that can be walked batch by batch, any number of times.
///
/// Each call to `batches()` starts a fresh pass; shuffling sources reorder
/// their samples per pass. Iteration blocks on whatever loading the source
/// does.
pub trait BatchSource {
    /// Batches yielded by one pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;

    /// Label → class index mapping for the samples in this source.
    fn class_to_idx(&self) -> &ClassToIdx;
}

/// Fails unless `split` labels its classes exactly like `reference`.
pub fn ensure_same_classes(reference: &ClassToIdx, split: &ClassToIdx, name: &str) -> Result<()> {
    if reference != split {
        let missing: Vec<&str> = reference.keys().filter(|k| !split.contains_key(*k)).map(String::as_str).collect();
        let extra: Vec<&str> = split.keys().filter(|k| !reference.contains_key(*k)).map(String::as_str).collect();
        return Err(Error::Dataset(format!(
            "{} classes differ from training (missing: {:?}, unexpected: {:?})",
            name, missing, extra
        )));
    }
    Ok(())
}

/// Pre-built batches held in memory.
pub struct InMemorySource {
    batches: Vec<Batch>,
    class_to_idx: ClassToIdx,
    shuffle: bool,
}

impl InMemorySource {
    pub fn new(batches: Vec<Batch>, class_to_idx: ClassToIdx) -> InMemorySource {
        InMemorySource { batches, class_to_idx, shuffle: false }
    }

    /// Visit batches in a new random order on every pass.
    pub fn shuffled(mut self) -> InMemorySource {
        self.shuffle = true;
        self
    }
}

impl BatchSource for InMemorySource {
    fn len(&self) -> usize {
        self.batches.len()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let mut order: Vec<usize> = (0..self.batches.len()).collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        let batches = &self.batches;
        Box::new(order.into_iter().map(move |i| Ok(batches[i].clone())))
    }

    fn class_to_idx(&self) -> &ClassToIdx {
        &self.class_to_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(tag: f64) -> Batch {
        Batch::new(Matrix::from_data(vec![vec![tag, tag]]), vec![0]).unwrap()
    }

    #[test]
    fn test_batch_rejects_mismatched_labels() {
        assert!(Batch::new(Matrix::zeros(2, 3), vec![0]).is_err());
    }

    #[test]
    fn test_batch_rejects_ragged_rows() {
        let ragged = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0, 4.0, 5.0]]);
        assert!(matches!(Batch::new(ragged, vec![0, 1]), Err(Error::BatchProcessingFailure(_))));
    }

    #[test]
    fn test_ensure_same_classes() {
        let train: ClassToIdx = [("1", 0), ("10", 1), ("2", 2)].iter().map(|(l, i)| (l.to_string(), *i)).collect();
        assert!(ensure_same_classes(&train, &train.clone(), "valid").is_ok());

        let mut short = train.clone();
        short.remove("10");
        short.insert("2".to_string(), 1);
        assert!(matches!(ensure_same_classes(&train, &short, "test"), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_in_memory_passes_repeat() {
        let mut source = InMemorySource::new(vec![batch(1.0), batch(2.0), batch(3.0)], ClassToIdx::new());
        assert_eq!(source.len(), 3);
        for _ in 0..2 {
            let tags: Vec<f64> = source.batches().map(|b| b.unwrap().inputs.data[0][0]).collect();
            assert_eq!(tags, vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_shuffled_source_yields_every_batch() {
        let mut source = InMemorySource::new((0..20).map(|i| batch(i as f64)).collect(), ClassToIdx::new())
            .shuffled();
        let mut tags: Vec<f64> = source.batches().map(|b| b.unwrap().inputs.data[0][0]).collect();
        tags.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(tags, (0..20).map(|i| i as f64).collect::<Vec<_>>());
    }
}

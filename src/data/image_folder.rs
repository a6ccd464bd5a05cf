use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data::batch::{Batch, BatchSource};
use crate::data::transform::Transform;
use crate::error::{Error, Result};
use crate::layers::pool::InputShape;
use crate::math::matrix::Matrix;
use crate::network::metadata::ClassToIdx;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// Images laid out as `<root>/<class label>/<image>`.
///
/// Class indices follow the lexicographic order of the label directories.
/// Images are decoded lazily, one batch at a time.
pub struct ImageFolder {
    root: PathBuf,
    samples: Vec<(PathBuf, usize)>,
    class_to_idx: ClassToIdx,
    transform: Transform,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl ImageFolder {
    pub fn open(root: &Path, transform: Transform, batch_size: usize, shuffle: bool) -> Result<ImageFolder> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let mut labels = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                labels.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        labels.sort();
        if labels.is_empty() {
            return Err(Error::Dataset(format!("no class directories under {:?}", root)));
        }

        let class_to_idx: ClassToIdx = labels.iter().cloned().enumerate().map(|(i, l)| (l, i)).collect();

        let mut samples = Vec::new();
        for label in &labels {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(root.join(label))? {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    files.push(path);
                }
            }
            files.sort();
            let idx = class_to_idx[label];
            samples.extend(files.into_iter().map(|path| (path, idx)));
        }
        if samples.is_empty() {
            return Err(Error::Dataset(format!("no images under {:?}", root)));
        }

        info!(
            "{:?}: {} images in {} classes ({:?}, batch size {})",
            root,
            samples.len(),
            class_to_idx.len(),
            transform,
            batch_size
        );

        Ok(ImageFolder {
            root: root.to_path_buf(),
            samples,
            class_to_idx,
            transform,
            batch_size,
            shuffle,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn input_shape(&self) -> InputShape {
        self.transform.input_shape()
    }
}

impl BatchSource for ImageFolder {
    fn len(&self) -> usize {
        (self.samples.len() + self.batch_size - 1) / self.batch_size
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let ImageFolder { samples, transform, batch_size, shuffle, rng, .. } = self;

        let mut order: Vec<usize> = (0..samples.len()).collect();
        if *shuffle {
            order.shuffle(rng);
        }
        let chunks: Vec<Vec<usize>> = order.chunks(*batch_size).map(<[usize]>::to_vec).collect();
        let samples: &[(PathBuf, usize)] = samples;
        let transform = *transform;

        Box::new(chunks.into_iter().map(move |chunk| {
            let mut rows = Vec::with_capacity(chunk.len());
            let mut labels = Vec::with_capacity(chunk.len());
            for i in chunk {
                let (path, label) = &samples[i];
                let image = image::open(path)
                    .map_err(|e| Error::Image(format!("{:?}: {}", path, e)))?;
                rows.push(transform.apply(&image, rng));
                labels.push(*label);
            }
            debug!("Loaded batch of {} images", rows.len());
            Batch::new(Matrix::from_data(rows), labels)
        }))
    }

    fn class_to_idx(&self) -> &ClassToIdx {
        &self.class_to_idx
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

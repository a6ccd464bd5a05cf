use ferrite_petals::backbone::{BackboneRegistry, SyntheticWeights};
use ferrite_petals::checkpoint::{save_checkpoint, Checkpoint};
use ferrite_petals::config::{EvalTransform, TrainingConfig};
use ferrite_petals::data::{ensure_same_classes, BatchSource, ImageFolder};
use ferrite_petals::device::Device;
use ferrite_petals::network::{assemble_on, OUTPUT_CLASSES};
use ferrite_petals::optim::Adam;
use ferrite_petals::train::{evaluate, train_model, TrainConfig};
use ferrite_petals::{Architecture, Error};
use image::{Rgb, RgbImage};
use std::path::Path;
use tempfile::TempDir;

const SIZE: u32 = 8;

/// `<root>/{train,valid,test}/<label>/*.png` with a few tiny images per class.
fn write_split(root: &Path, split: &str, labels: &[&str], per_class: usize) {
    for (c, label) in labels.iter().enumerate() {
        let dir = root.join(split).join(label);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let image = RgbImage::from_fn(16, 12, |x, y| {
                Rgb([(c * 90) as u8, (x * 10 + i as u32) as u8, (y * 15) as u8])
            });
            image.save(dir.join(format!("image_{:02}.png", i))).unwrap();
        }
    }
}

fn flowers() -> TempDir {
    let dir = TempDir::new().unwrap();
    let labels = ["1", "10", "2"];
    write_split(dir.path(), "train", &labels, 4);
    write_split(dir.path(), "valid", &labels, 1);
    write_split(dir.path(), "test", &labels, 1);
    dir
}

fn config(data_dir: &Path, eval_transform: EvalTransform) -> TrainingConfig {
    TrainingConfig {
        data_dir: data_dir.to_path_buf(),
        save_dir: data_dir.join("checkpoints").join("flowers.ckpt"),
        arch: "densenet121".to_string(),
        hidden_units: 16,
        batch_size: 2,
        print_every: 3,
        image_size: SIZE,
        eval_transform,
        ..TrainingConfig::default()
    }
}

fn run(config: &TrainingConfig) -> Checkpoint {
    config.validate().unwrap();
    let mut train = ImageFolder::open(&config.train_dir(), config.train_transform(), config.batch_size, true).unwrap();
    let mut valid = ImageFolder::open(&config.valid_dir(), config.eval_transform(), config.batch_size, false).unwrap();
    let mut test = ImageFolder::open(&config.test_dir(), config.eval_transform(), config.batch_size, false).unwrap();

    let registry = BackboneRegistry::new(SyntheticWeights::new(train.input_shape(), 3).with_pool(2));
    let (mut network, _, width) = assemble_on(&registry, &config.arch, config.hidden_units, Device::Cpu).unwrap();
    let mut adam = Adam::new(&network.classifier, config.learning_rate);

    let train_config = TrainConfig::new(config.epochs).with_print_every(config.print_every);
    let summary = train_model(&mut network, &mut adam, &mut train, &mut valid, &train_config).unwrap();
    // 12 images in batches of 2: validation after steps 3 and 6.
    assert_eq!(summary.reports().len(), 2);
    for report in summary.reports() {
        assert!(report.validation_loss.is_finite());
        assert!((0.0..=1.0).contains(&report.validation_accuracy));
    }

    network.eval();
    let test_eval = evaluate(&network, &mut test).unwrap();
    assert_eq!(test_eval.batches, 2);

    save_checkpoint(
        &config.save_dir, &mut network, &train, config.epochs, &adam, config.learning_rate,
        width, OUTPUT_CLASSES, Architecture::Densenet121, config.hidden_units,
    ).unwrap()
}

#[test]
fn augmented_evaluation_trains_and_checkpoints() {
    let data = flowers();
    let checkpoint = run(&config(data.path(), EvalTransform::Augment));

    let order: Vec<(&str, usize)> = checkpoint.class_to_idx.iter().map(|(l, i)| (l.as_str(), *i)).collect();
    assert_eq!(order, vec![("1", 0), ("10", 1), ("2", 2)]);
    assert_eq!(Checkpoint::read(&data.path().join("checkpoints/flowers.ckpt")).unwrap(), checkpoint);
}

#[test]
fn deterministic_evaluation_is_repeatable() {
    let data = flowers();
    let config = config(data.path(), EvalTransform::Deterministic);
    run(&config);

    let mut valid = ImageFolder::open(&config.valid_dir(), config.eval_transform(), 3, false).unwrap();
    let first: Vec<_> = valid.batches().collect::<Result<_, Error>>().unwrap();
    let second: Vec<_> = valid.batches().collect::<Result<_, Error>>().unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].inputs.cols, 3 * (SIZE * SIZE) as usize);
}

#[test]
fn missing_split_is_an_error() {
    let data = TempDir::new().unwrap();
    write_split(data.path(), "train", &["1"], 1);
    let config = config(data.path(), EvalTransform::Augment);
    assert!(ImageFolder::open(&config.valid_dir(), config.eval_transform(), 2, false).is_err());
}

#[test]
fn split_with_different_classes_is_rejected() {
    let data = TempDir::new().unwrap();
    write_split(data.path(), "train", &["1", "10", "2"], 1);
    write_split(data.path(), "valid", &["1", "2"], 1);
    let config = config(data.path(), EvalTransform::Deterministic);

    let train = ImageFolder::open(&config.train_dir(), config.train_transform(), 2, false).unwrap();
    let valid = ImageFolder::open(&config.valid_dir(), config.eval_transform(), 2, false).unwrap();
    assert_eq!(valid.class_to_idx()["2"], 1);
    assert!(matches!(
        ensure_same_classes(train.class_to_idx(), valid.class_to_idx(), "validation"),
        Err(Error::Dataset(_))
    ));
}

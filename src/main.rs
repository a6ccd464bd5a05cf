//! `ferrite-petals`: fine-tune a pretrained backbone into a 102-species
//! flower classifier and write a checkpoint.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use ferrite_petals::backbone::{Architecture, BackboneRegistry, WeightsDir};
use ferrite_petals::config::{EvalTransform, TrainingConfig};
use ferrite_petals::data::{ensure_same_classes, BatchSource, ImageFolder};
use ferrite_petals::logging::{init_logging, LogConfig, LogLevel};
use ferrite_petals::network::metadata::{load_category_names, output_labels};
use ferrite_petals::network::{assemble, OUTPUT_CLASSES};
use ferrite_petals::optim::Adam;
use ferrite_petals::train::{evaluate, train_model, TrainConfig};
use ferrite_petals::checkpoint::save_checkpoint;

/// Train a flower-species classifier on top of a frozen pretrained backbone
#[derive(Parser, Debug)]
#[command(name = "ferrite-petals", version)]
struct Args {
    /// Directory holding train/, valid/ and test/ splits
    #[arg(value_name = "DATA_DIR")]
    data_dir: PathBuf,

    /// Checkpoint path
    #[arg(long, value_name = "FILE", default_value = "train_checkpoint.ckpt")]
    save_dir: PathBuf,

    /// Backbone architecture (vgg16 or densenet121)
    #[arg(long, default_value = "vgg16")]
    arch: String,

    /// Learning rate
    #[arg(long = "lrn", value_name = "LR", default_value_t = 0.001)]
    learning_rate: f64,

    #[arg(long, default_value_t = 512)]
    hidden_units: usize,

    #[arg(long, default_value_t = 1)]
    epochs: usize,

    /// Train on the parallel accelerator instead of the CPU
    #[arg(long)]
    gpu: bool,

    /// Pretrained weights cache
    #[arg(long, value_name = "DIR", default_value = "pretrained")]
    weights_dir: PathBuf,

    /// JSON map from class label to flower name
    #[arg(long, value_name = "FILE")]
    category_names: Option<PathBuf>,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Training steps between validation passes
    #[arg(long, default_value_t = 5)]
    print_every: usize,

    /// Side of the square crop fed to the backbone
    #[arg(long, default_value_t = 224)]
    image_size: u32,

    /// Preprocessing for the validation and test splits
    #[arg(long, value_enum, default_value_t = EvalTransform::Augment)]
    eval_transform: EvalTransform,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

impl From<Args> for TrainingConfig {
    fn from(args: Args) -> Self {
        TrainingConfig {
            data_dir: args.data_dir,
            save_dir: args.save_dir,
            arch: args.arch,
            learning_rate: args.learning_rate,
            hidden_units: args.hidden_units,
            epochs: args.epochs,
            use_accelerator: args.gpu,
            weights_dir: args.weights_dir,
            category_names: args.category_names,
            batch_size: args.batch_size,
            print_every: args.print_every,
            image_size: args.image_size,
            eval_transform: args.eval_transform,
            log_level: args.log_level,
        }
    }
}

fn main() -> Result<()> {
    let config = TrainingConfig::from(Args::parse());
    init_logging(&LogConfig::with_level(config.log_level))?;
    config.validate()?;
    info!("Configuration: {}", serde_json::to_string(&config)?);

    // ---
    // Data
    // ---
    let mut train_source = ImageFolder::open(&config.train_dir(), config.train_transform(), config.batch_size, true)
        .with_context(|| format!("failed to open training split under {:?}", config.data_dir))?;
    let mut valid_source = ImageFolder::open(&config.valid_dir(), config.eval_transform(), config.batch_size, false)
        .context("failed to open validation split")?;
    let mut test_source = ImageFolder::open(&config.test_dir(), config.eval_transform(), config.batch_size, false)
        .context("failed to open test split")?;

    ensure_same_classes(train_source.class_to_idx(), valid_source.class_to_idx(), "validation")?;
    ensure_same_classes(train_source.class_to_idx(), test_source.class_to_idx(), "test")?;

    info!(
        "{} training images from {:?}, {} validation, {} test",
        train_source.sample_count(),
        train_source.root(),
        valid_source.sample_count(),
        test_source.sample_count()
    );

    if let Some(ref path) = config.category_names {
        let names = load_category_names(path)
            .with_context(|| format!("failed to read category names from {:?}", path))?;
        let labels = output_labels(train_source.class_to_idx(), &names);
        info!("{} classes: {}", labels.len(), labels.join(", "));
    }

    // ---
    // Model
    // ---
    let arch = Architecture::from_name(&config.arch)?;
    let registry = BackboneRegistry::new(WeightsDir::new(&config.weights_dir));
    let (mut network, device, feature_width) =
        assemble(&registry, &config.arch, config.hidden_units, config.use_accelerator)?;
    if network.backbone().input_shape() != train_source.input_shape() {
        bail!(
            "{} expects {:?} inputs but --image-size {} yields {:?}",
            arch,
            network.backbone().input_shape(),
            config.image_size,
            train_source.input_shape()
        );
    }
    info!("Training on {}", device);

    let mut optimizer = Adam::new(&network.classifier, config.learning_rate);

    // ---
    // Train, evaluate, save
    // ---
    let train_config = TrainConfig::new(config.epochs).with_print_every(config.print_every);
    train_model(&mut network, &mut optimizer, &mut train_source, &mut valid_source, &train_config)?;

    network.eval();
    let test = evaluate(&network, &mut test_source)?;
    info!("Test loss: {:.3}.. Test accuracy: {:.3}", test.loss, test.accuracy);

    save_checkpoint(
        &config.save_dir,
        &mut network,
        &train_source,
        config.epochs,
        &optimizer,
        config.learning_rate,
        feature_width,
        OUTPUT_CLASSES,
        arch,
        config.hidden_units,
    )?;
    info!("Checkpoint written to {:?}", config.save_dir);
    Ok(())
}

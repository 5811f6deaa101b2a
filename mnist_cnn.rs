// mnist_cnn.rs
// CNN for MNIST on CPU built on the rust_cnn library.
//
// Usage:
//   mnist_cnn <train.csv> <test.csv> [training.json] [architecture.json]
//
// CSV rows are `label,p0,...,p783`. Without an architecture file the network is
//   conv(32, 3x3, relu) -> relu -> maxpool(2) -> flatten -> dense(128) -> relu
//   -> dense(10) -> softmax + cross-entropy.
//
// Output:
//   - logs/training_loss_cnn.txt (epoch,loss,accuracy,time)
//   - prints validation accuracy after every epoch
//
// Library logging goes to stderr; set RUST_CNN_LOG=error|warn|info|debug|trace.

use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::process;
use std::str::FromStr;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};
use rust_cnn::architecture::{build_network, load_architecture};
use rust_cnn::config::{load_config, TrainingConfig};
use rust_cnn::data::{parse_mnist_csv, IMAGE_SIDE, NUM_CLASSES};
use rust_cnn::layers::Layer;
use rust_cnn::loss::CrossEntropyLoss;
use rust_cnn::utils::ActivationKind;
use rust_cnn::{Network, Result};

const LOG_PATH: &str = "./logs/training_loss_cnn.txt";

/// Minimal stderr logger; the level is read once from `RUST_CNN_LOG`.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn log_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

fn init_logging() {
    let level = log_level(env::var("RUST_CNN_LOG").ok().as_deref());
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// The reference MNIST topology.
fn default_network(seed: u64) -> Network {
    let mut network = Network::with_seed(seed);
    network
        .add(Layer::conv2d(32, 3, 3, 1, 0, Some(ActivationKind::Relu)))
        .add(Layer::activation(ActivationKind::Relu))
        .add(Layer::max_pool(2, 2))
        .add(Layer::flatten())
        .add(Layer::dense(128, Some(ActivationKind::Relu)))
        .add(Layer::activation(ActivationKind::Relu))
        .add(Layer::dense(NUM_CLASSES, Some(ActivationKind::Softmax)))
        .add(Layer::activation(ActivationKind::SoftmaxCrossEntropy))
        .set_input_shape(&[1, IMAGE_SIDE, IMAGE_SIDE]);
    network
}

fn run(args: &[String]) -> Result<()> {
    let config = match args.get(2) {
        Some(path) => load_config(path)?,
        None => TrainingConfig::default(),
    };
    let mut network = match args.get(3) {
        Some(path) => build_network(&load_architecture(path)?, config.seed)?,
        None => default_network(config.seed),
    };
    network.set_gradient_reduction(config.reduction()?);

    println!("Loading MNIST...");
    let (train_data, train_labels) = parse_mnist_csv(&args[0])?;
    let (test_data, test_labels) = parse_mnist_csv(&args[1])?;
    println!(
        "Train: {} | Test: {}",
        train_data.shape()[0],
        test_data.shape()[0]
    );

    network.compile(Box::new(CrossEntropyLoss::new()), config.build_optimizer()?)?;
    println!(
        "Training CNN: epochs={} batch={} optimizer={} lr={} params={}",
        config.epochs,
        config.batch_size,
        config.optimizer,
        config.learning_rate,
        network.parameter_count()
    );

    let mut epoch_start = Instant::now();
    let mut epoch_stats = Vec::with_capacity(config.epochs);
    let history = network.fit_with_callback(
        &train_data,
        &train_labels,
        config.epochs,
        config.batch_size,
        |net, epoch| {
            let secs = epoch_start.elapsed().as_secs_f32();
            let accuracy = net.one_hot_accuracy(&test_data, &test_labels)?;
            println!(
                "Epoch {} | val_accuracy={:.2}% | time={:.3}s",
                epoch + 1,
                accuracy * 100.0,
                secs
            );
            epoch_stats.push((accuracy, secs));
            epoch_start = Instant::now();
            Ok(())
        },
    )?;

    fs::create_dir_all("./logs")?;
    let mut log = BufWriter::new(File::create(LOG_PATH)?);
    for (epoch, (loss, (accuracy, secs))) in history.epoch_losses.iter().zip(&epoch_stats).enumerate() {
        writeln!(log, "{},{},{},{}", epoch + 1, loss, accuracy, secs)?;
    }
    log.flush()?;

    println!("Testing...");
    let evaluation = network.evaluate(&test_data, &test_labels)?;
    println!(
        "Test Loss: {:.6} | Test Accuracy: {:.2}%",
        evaluation.loss,
        evaluation.accuracy * 100.0
    );
    Ok(())
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: mnist_cnn <train.csv> <test.csv> [training.json] [architecture.json]");
        process::exit(2);
    }

    if let Err(err) = run(&args) {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_cnn::optimizers::SGD;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(log_level(None), LevelFilter::Info);
        assert_eq!(log_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(log_level(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(log_level(Some("verbose")), LevelFilter::Info);
    }

    #[test]
    fn test_default_network_shapes() {
        let mut network = default_network(1);
        network
            .compile(Box::new(CrossEntropyLoss::new()), Box::new(SGD::new(0.01)))
            .unwrap();
        assert_eq!(network.output_shape(), Some(&[NUM_CLASSES][..]));
        // conv 32*9+32, dense 32*13*13*128+128, dense 128*10+10
        assert_eq!(
            network.parameter_count(),
            (32 * 9 + 32) + (32 * 13 * 13 * 128 + 128) + (128 * 10 + 10)
        );
    }
}

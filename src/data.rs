//! MNIST CSV loading
//!
//! Each row is `label,p0,...,p783`: an integer class label in `0..10`
//! followed by 784 pixel intensities in `0..=255`. Pixels are scaled to
//! `[0, 1]` and laid out as `[N, 1, 28, 28]`; labels become one-hot rows of
//! shape `[N, 10]`.
//!
//! Blank lines are skipped, as is a leading header row whose first field is
//! `label`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::error::{NnError, Result};
use crate::tensor::NDArray;

pub const IMAGE_SIDE: usize = 28;
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const NUM_CLASSES: usize = 10;

/// Read an MNIST CSV file into `(data, labels)` tensors.
pub fn parse_mnist_csv(path: impl AsRef<Path>) -> Result<(NDArray, NDArray)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let (data, labels) = parse_mnist_reader(BufReader::new(file))?;
    info!("loaded {} samples from {}", labels.shape()[0], path.display());
    Ok((data, labels))
}

/// Parse MNIST CSV rows from any buffered reader.
///
/// # Example
///
/// ```
/// use rust_cnn::data::parse_mnist_reader;
///
/// let mut row = String::from("3");
/// for _ in 0..784 {
///     row.push_str(",255");
/// }
/// let (data, labels) = parse_mnist_reader(row.as_bytes()).unwrap();
/// assert_eq!(data.shape(), &[1, 1, 28, 28]);
/// assert_eq!(labels.data()[3], 1.0);
/// ```
pub fn parse_mnist_reader<R: BufRead>(reader: R) -> Result<(NDArray, NDArray)> {
    let mut pixels = Vec::new();
    let mut classes = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if index == 0 && trimmed.split(',').next().map(str::trim) == Some("label") {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() != IMAGE_PIXELS + 1 {
            return Err(NnError::Parse {
                line: line_no,
                message: format!(
                    "expected {} fields (label + {} pixels), found {}",
                    IMAGE_PIXELS + 1,
                    IMAGE_PIXELS,
                    fields.len()
                ),
            });
        }

        let label: usize = fields[0].parse().map_err(|_| NnError::Parse {
            line: line_no,
            message: format!("invalid label '{}'", fields[0]),
        })?;
        if label >= NUM_CLASSES {
            return Err(NnError::Parse {
                line: line_no,
                message: format!("label {} out of range 0..{}", label, NUM_CLASSES),
            });
        }
        classes.push(label);

        for token in &fields[1..] {
            let value: f32 = token.parse().map_err(|_| NnError::Parse {
                line: line_no,
                message: format!("invalid pixel value '{}'", token),
            })?;
            pixels.push(value / 255.0);
        }
    }

    if classes.is_empty() {
        return Err(NnError::Parse {
            line: 0,
            message: "the CSV input contains no samples".to_string(),
        });
    }

    let samples = classes.len();
    let mut one_hot = vec![0.0; samples * NUM_CLASSES];
    for (row, &class) in classes.iter().enumerate() {
        one_hot[row * NUM_CLASSES + class] = 1.0;
    }

    let data = NDArray::from_vec(&[samples, 1, IMAGE_SIDE, IMAGE_SIDE], pixels)?;
    let labels = NDArray::from_vec(&[samples, NUM_CLASSES], one_hot)?;
    Ok((data, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(label: &str, pixel: &str) -> String {
        let mut line = label.to_string();
        for _ in 0..IMAGE_PIXELS {
            line.push(',');
            line.push_str(pixel);
        }
        line
    }

    #[test]
    fn test_parse_scales_pixels_and_one_hot_labels() {
        let csv = format!("{}\n\n{}\n", row("7", "51"), row("0", "0"));
        let (data, labels) = parse_mnist_reader(csv.as_bytes()).unwrap();

        assert_eq!(data.shape(), &[2, 1, 28, 28]);
        assert_eq!(labels.shape(), &[2, 10]);
        assert_relative_eq!(data.get(&[0, 0, 27, 27]).unwrap(), 0.2);
        assert_eq!(data.get(&[1, 0, 0, 0]).unwrap(), 0.0);
        assert_eq!(labels.argmax_rows(), vec![7, 0]);
        for r in labels.data().chunks(10) {
            assert_eq!(r.iter().sum::<f32>(), 1.0);
        }
    }

    #[test]
    fn test_header_row_is_skipped() {
        let mut header = String::from("label");
        for i in 0..IMAGE_PIXELS {
            header.push_str(&format!(",pixel{}", i));
        }
        let csv = format!("{}\n{}\n", header, row("4", "255"));
        let (_, labels) = parse_mnist_reader(csv.as_bytes()).unwrap();
        assert_eq!(labels.shape(), &[1, 10]);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            parse_mnist_reader("\n\n".as_bytes()),
            Err(NnError::Parse { .. })
        ));
    }

    #[test]
    fn test_wrong_row_width() {
        let csv = format!("{}\n1,2,3\n", row("1", "0"));
        match parse_mnist_reader(csv.as_bytes()) {
            Err(NnError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_label_out_of_range() {
        assert!(parse_mnist_reader(row("10", "0").as_bytes()).is_err());
        assert!(parse_mnist_reader(row("-1", "0").as_bytes()).is_err());
    }

    #[test]
    fn test_bad_pixel_token() {
        let err = parse_mnist_reader(row("1", "abc").as_bytes()).unwrap_err();
        assert!(err.to_string().contains("abc"));
    }
}

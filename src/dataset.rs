use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    error::{GazeError, Result},
    systems::features::FeatureVector,
};

pub const DATASET_HEADER: &str = "f1,f2,f3,f4,tx,ty";
const COLUMNS: usize = 6;

/// One labelled observation: the features seen while the user looked at `target`
/// (normalised screen units).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub features: FeatureVector,
    pub target: Point2D,
}

impl CalibrationSample {
    pub fn new(features: FeatureVector, target: Point2D) -> Self {
        CalibrationSample { features, target }
    }
}

/// Write all samples as a fresh CSV, replacing whatever was at `path`.
///
/// The rows go to a sibling temporary file first, which is then renamed over the
/// destination; a failed write leaves any previous dataset intact.
pub fn write_dataset(path: &Path, samples: &[CalibrationSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".partial");
    let tmp_path = path.with_file_name(tmp_name);

    let written = (|| -> Result<()> {
        let mut out = BufWriter::new(fs::File::create(&tmp_path)?);
        writeln!(out, "{}", DATASET_HEADER)?;
        for s in samples {
            let [f1, f2, f3, f4] = s.features.values();
            let (tx, ty) = s.target;
            writeln!(out, "{},{},{},{},{},{}", f1, f2, f3, f4, tx, ty)?;
        }
        out.flush()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path)?;
    info!("Saved {} samples to {:?}", samples.len(), path);
    Ok(())
}

/// Parse a dataset CSV. The first line is the header and is skipped without inspection;
/// blank lines are ignored.
pub fn load_dataset(path: &Path) -> Result<Vec<CalibrationSample>> {
    let text = fs::read_to_string(path)?;
    let samples = parse_dataset(&text)?;
    debug!("Loaded {} samples from {:?}", samples.len(), path);
    Ok(samples)
}

pub fn parse_dataset(text: &str) -> Result<Vec<CalibrationSample>> {
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_i, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_row(i + 1, line))
        .collect()
}

fn parse_row(line_number: usize, line: &str) -> Result<CalibrationSample> {
    let values = line
        .split(',')
        .map(|field| {
            field
                .trim()
                .parse::<f32>()
                .map_err(|e| GazeError::MalformedDataset {
                    line: line_number,
                    reason: format!("\"{}\": {}", field.trim(), e),
                })
        })
        .collect::<Result<Vec<f32>>>()?;

    if values.len() != COLUMNS {
        return Err(GazeError::MalformedDataset {
            line: line_number,
            reason: format!("expected {} columns, found {}", COLUMNS, values.len()),
        });
    }

    Ok(CalibrationSample::new(
        FeatureVector([values[0], values[1], values[2], values[3]]),
        (values[4], values[5]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> CalibrationSample {
        let v = i as f32 * 0.1;
        CalibrationSample::new(FeatureVector([-0.5 + v, 0.01, 0.5 - v, -0.01]), (0.15, 0.85))
    }

    #[test]
    fn test_written_file_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("samples.csv");
        let samples: Vec<CalibrationSample> = (0..3).map(sample).collect();

        write_dataset(&path, &samples).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(DATASET_HEADER));
        assert_eq!(lines.count(), 3);
        assert_eq!(load_dataset(&path).unwrap(), samples);
        assert!(!dir.path().join("data").join("samples.csv.partial").exists());
    }

    #[test]
    fn test_write_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        write_dataset(&path, &(0..5).map(sample).collect::<Vec<_>>()).unwrap();
        write_dataset(&path, &[sample(1)]).unwrap();
        assert_eq!(load_dataset(&path).unwrap(), vec![sample(1)]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let text = "f1,f2,f3,f4,tx,ty\n0,0,0,0,0.5,0.5\n\n1,1,1,1,0.15,0.85\n";
        let samples = parse_dataset(text).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].target, (0.15, 0.85));
    }

    #[test]
    fn test_malformed_rows_name_the_line() {
        let text = "f1,f2,f3,f4,tx,ty\n0,0,0,0,0.5,0.5\n0,0,zero,0,0.5,0.5\n";
        match parse_dataset(text) {
            Err(GazeError::MalformedDataset { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed dataset, got {:?}", other),
        }

        let text = "f1,f2,f3,f4,tx,ty\n0,0,0,0,0.5\n";
        assert!(matches!(
            parse_dataset(text),
            Err(GazeError::MalformedDataset { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_dataset(&dir.path().join("nope.csv")),
            Err(GazeError::Io(_))
        ));
    }
}

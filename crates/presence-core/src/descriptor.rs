//! Face descriptors and the Euclidean comparator.
//!
//! Scores use similarity mode throughout the workspace:
//! `similarity = clamp(1 - euclidean_distance, 0, 1)`, higher is better.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the descriptors produced by the browser-side detector.
pub const DEFAULT_DESCRIPTOR_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
    #[error("at least one descriptor sample is required")]
    NoSamples,
}

/// Face descriptor: a fixed-length embedding from an external detector.
///
/// Serializes as a bare JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reject empty descriptors and NaN/infinite components.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        match self.values.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(DescriptorError::NonFinite { index }),
            None => Ok(()),
        }
    }

    /// Compute Euclidean distance between two descriptors.
    ///
    /// Fails instead of truncating when the lengths differ.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Result<f32, DescriptorError> {
        if self.values.len() != other.values.len() {
            return Err(DescriptorError::LengthMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }

    /// Similarity in [0, 1] derived from Euclidean distance. 1.0 = identical.
    pub fn similarity(&self, other: &Descriptor) -> Result<f32, DescriptorError> {
        self.euclidean_distance(other)
            .map(|distance| (1.0 - distance).clamp(0.0, 1.0))
    }

    /// Element-wise mean of several captures of the same face.
    ///
    /// All samples must share the first sample's length.
    pub fn mean(samples: &[Descriptor]) -> Result<Descriptor, DescriptorError> {
        let first = samples.first().ok_or(DescriptorError::NoSamples)?;
        let len = first.len();

        let mut sums = vec![0.0f32; len];
        for sample in samples {
            if sample.len() != len {
                return Err(DescriptorError::LengthMismatch {
                    expected: len,
                    actual: sample.len(),
                });
            }
            for (sum, v) in sums.iter_mut().zip(sample.values.iter()) {
                *sum += v;
            }
        }

        let count = samples.len() as f32;
        Ok(Descriptor {
            values: sums.into_iter().map(|s| s / count).collect(),
        })
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Score two descriptors in similarity mode.
pub fn compare(a: &Descriptor, b: &Descriptor) -> Result<f32, DescriptorError> {
    a.similarity(b)
}

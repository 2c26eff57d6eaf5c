use crate::config::DEFAULT_MAX_DESIRED_COUNT;
use crate::error::ValidationError;
use crate::types::{JobParameters, ParameterInput};

/// Checks user input before a job is submitted.
///
/// Rules run in a fixed order and the first failure wins: bounds present,
/// bounds positive, range not inverted, count in range.
#[derive(Debug, Clone, Copy)]
pub struct ParameterValidator {
    max_desired_count: u32,
}

impl Default for ParameterValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESIRED_COUNT)
    }
}

impl ParameterValidator {
    pub fn new(max_desired_count: u32) -> Self {
        Self { max_desired_count }
    }

    pub fn validate(&self, input: &ParameterInput) -> Result<JobParameters, ValidationError> {
        let (min, max) = match (input.min_price, input.max_price) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(ValidationError::MissingBound),
        };

        if !is_positive(min) || !is_positive(max) {
            return Err(ValidationError::NonPositiveBound);
        }

        if min > max {
            return Err(ValidationError::InvertedRange { min, max });
        }

        let count = input.desired_count;
        let in_range = count.fract() == 0.0
            && count >= 1.0
            && count <= f64::from(self.max_desired_count);
        if !in_range {
            return Err(ValidationError::CountOutOfRange {
                value: count,
                max: self.max_desired_count,
            });
        }

        Ok(JobParameters {
            desired_count: count as u32,
            min_price: min,
            max_price: max,
        })
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

//! Numeric parsing and row/column statistics.
//!
//! Samples are stored row-major: one `Vec<f64>` per selected record, one
//! column per time sample. Standard deviations are population (ddof = 0)
//! and percentiles interpolate linearly between closest ranks.

/// Sentinel used by exports for a missing sample.
pub const NODATA: &str = "nodata";

/// Parse a comma-separated data field into samples.
///
/// `nodata` becomes NaN. Any other token that is not a float is returned
/// as the error value.
pub fn parse_data_field(data: &str) -> Result<Vec<f64>, String> {
    data.split(',')
        .map(|token| {
            let token = token.trim();
            if token == NODATA {
                Ok(f64::NAN)
            } else {
                token.parse::<f64>().map_err(|_| token.to_string())
            }
        })
        .collect()
}

/// Arithmetic mean. NaN propagates; an empty slice yields NaN.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. NaN propagates; an empty slice yields NaN.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile `q` (0..=100) with linear interpolation.
///
/// Returns `None` for an empty slice or when any value is NaN.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Tukey fences derived from the interquartile range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fences {
    pub q25: f64,
    pub q75: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Fences {
    /// Compute fences `q25 - k*IQR` and `q75 + k*IQR`.
    pub fn from_values(values: &[f64], k: f64) -> Option<Self> {
        let q25 = percentile(values, 25.0)?;
        let q75 = percentile(values, 75.0)?;
        let iqr = q75 - q25;
        Some(Self {
            q25,
            q75,
            lower: q25 - k * iqr,
            upper: q75 + k * iqr,
        })
    }

    #[inline]
    pub fn iqr(&self) -> f64 {
        self.q75 - self.q25
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Column-wise mean of a rectangular matrix.
///
/// Returns an empty vector for an empty matrix.
pub fn column_means(matrix: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = matrix.first() else {
        return Vec::new();
    };

    let mut sums = vec![0.0; first.len()];
    for row in matrix {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += value;
        }
    }

    let n = matrix.len() as f64;
    sums.into_iter().map(|s| s / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_data_field() {
        let values = parse_data_field("1.5, -2,nodata,3e2").unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[0], 1.5);
        assert_eq!(values[1], -2.0);
        assert!(values[2].is_nan());
        assert_eq!(values[3], 300.0);
    }

    #[test]
    fn test_parse_data_field_rejects_garbage() {
        assert_eq!(parse_data_field("1.0,abc,2.0"), Err("abc".to_string()));
        assert_eq!(parse_data_field(""), Err(String::new()));
    }

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values), 5.0));
        assert!(approx(std_dev(&values), 2.0));
    }

    #[test]
    fn test_nan_propagates() {
        let values = [1.0, f64::NAN, 3.0];
        assert!(mean(&values).is_nan());
        assert!(std_dev(&values).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_percentile_linear() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!(approx(percentile(&values, 25.0).unwrap(), 1.75));
        assert!(approx(percentile(&values, 50.0).unwrap(), 2.5));
        assert!(approx(percentile(&values, 75.0).unwrap(), 3.25));
        assert!(approx(percentile(&values, 100.0).unwrap(), 4.0));
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[1.0, f64::NAN], 50.0), None);
    }

    #[test]
    fn test_fences() {
        let fences = Fences::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.5).unwrap();
        assert!(approx(fences.q25, 2.0));
        assert!(approx(fences.q75, 4.0));
        assert!(approx(fences.iqr(), 2.0));
        assert!(approx(fences.lower, -1.0));
        assert!(approx(fences.upper, 7.0));
        assert!(fences.contains(6.9));
        assert!(!fences.contains(7.1));
    }

    #[test]
    fn test_column_means() {
        let matrix = vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]];
        assert_eq!(column_means(&matrix), vec![2.0, 3.0, 4.0]);
        assert!(column_means(&[]).is_empty());
    }
}

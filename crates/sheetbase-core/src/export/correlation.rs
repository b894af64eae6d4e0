//! Pearson correlation over text columns.

use arrow::array::{Array, ArrayRef, Int64Array, StringArray};

/// Parse a stored value as a finite number; anything else is missing.
pub fn parse_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric view of an exported column: `Int64` values as-is, text parsed
/// with [`parse_numeric`], nulls and other types missing.
pub fn numeric_values(array: &ArrayRef) -> Vec<Option<f64>> {
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return ints.iter().map(|v| v.map(|v| v as f64)).collect();
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return strings.iter().map(|v| v.and_then(parse_numeric)).collect();
    }
    vec![None; array.len()]
}

/// Pearson coefficient over the positions where both sides are present.
///
/// `None` with fewer than two complete pairs or when either side has zero
/// variance.
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

//! Built-in sample tasks for demos.

use anyhow::{Result, anyhow};

pub const SAMPLE_TASKS: [&str; 3] = [
    "Write a Python function to compute Fibonacci(n) efficiently and print Fibonacci(35).",
    "Parse a CSV string into rows and compute average of a numeric column.",
    "Implement a simple anomaly score for a time series using rolling z-score.",
];

/// Look up a sample task by zero-based index.
pub fn sample_task(index: usize) -> Result<&'static str> {
    SAMPLE_TASKS.get(index).copied().ok_or_else(|| {
        anyhow!(
            "no sample task {index} (choose 0..={})",
            SAMPLE_TASKS.len() - 1
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_tasks_are_indexed_from_zero() {
        assert!(sample_task(0).expect("task").contains("Fibonacci(35)"));
        assert!(sample_task(2).expect("task").contains("z-score"));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let err = sample_task(3).unwrap_err();
        assert!(err.to_string().contains("0..=2"));
    }
}

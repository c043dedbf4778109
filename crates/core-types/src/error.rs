use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Time range is inverted: start {start} is after end {end}")]
    InvertedTimeRange { start: String, end: String },
}

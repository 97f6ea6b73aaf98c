use thiserror::Error;

pub type ZonalResult<T> = Result<T, ZonalError>;

#[derive(Debug, Error)]
pub enum ZonalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors rejected at initialization, before any bar is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown timeframe: '{0}'")]
    UnknownTimeframe(String),

    #[error("No timeframes configured")]
    EmptyTimeframes,

    #[error("The 1m base timeframe must be configured: it drives the bar loop")]
    MissingBaseTimeframe,

    #[error("Inconsistent risk parameters: {0}")]
    InvalidRisk(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Errors related to the input candle series and derived tables.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Empty candle series: {0}")]
    EmptySeries(String),

    #[error("Malformed OHLC at bar {index}: {msg}")]
    MalformedCandle { index: usize, msg: String },

    #[error("Timestamps must be strictly increasing: violation at bar {index}")]
    NonMonotonicTimestamp { index: usize },

    #[error("Duplicate timestamp at bar {index}")]
    DuplicateTimestamp { index: usize },

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error("Failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),
}

/// Errors raised by the replay engine while a run is in flight.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("POI '{0}' not found")]
    UnknownPoi(String),

    #[error("Trade {0} not found")]
    UnknownTrade(u64),

    #[error("Bar processing failed at bar {bar_index} ({timeframe}, {component}): {msg}")]
    BarProcessing {
        bar_index: usize,
        timeframe: String,
        component: String,
        msg: String,
    },
}

/// Errors related to report rendering and export.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to internal invariants and serialization plumbing.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Missing internal field: {0}")]
    MissingField(String),

    #[error("Failed to encode cache payload")]
    Encoding(#[from] postcard::Error),
}

pub mod cache;
pub mod candle;
pub mod domain;
pub mod resampler;

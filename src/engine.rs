pub mod backtester;
pub mod events;
pub mod portfolio;
pub mod trade_log;

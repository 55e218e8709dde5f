pub mod candle;
pub mod interval;
pub mod open_interest;

pub mod aggregate;
pub mod chart;
pub mod models;
pub mod window;

pub use models::{AlertLevel, Category, NumericField, SensorRecord, WaterLevel};

pub mod results;
pub mod ultralytics;

pub mod emissions;
pub mod http;
pub mod onnx;
pub mod tracking;
pub mod training;

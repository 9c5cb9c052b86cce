//! Near-real-time RIC xApp that collects MAC/RLC/PDCP statistics from E2
//! nodes and trains a one-step-ahead uplink RSSI regressor from them.

pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod predictor;
pub mod preprocess;
pub mod sdk;
pub mod sim;
pub mod split;
pub mod stats;
pub mod subscriber;
pub mod types;
pub mod xapp;

pub use error::{Result, XappError};

//! Trains one classifier from a CSV dataset and records the outcome on a
//! MongoDB training job.

pub mod adapters {
    pub mod input;
    pub mod mongo;
    pub mod output;
    pub mod store;
}

pub mod cli {
    pub mod interface;
}

pub mod core {
    pub mod error;
    pub mod job;
    pub mod metrics;
    pub mod pipeline;
    pub mod preprocess;
    pub mod runner;
}

pub mod estimators;

pub mod utils {
    pub mod config;
    pub mod lib;
}

pub mod data_loader;
pub mod inventory;
pub mod load_execution;
pub mod plan;
pub mod report;
pub mod storage;

pub mod config;
pub mod context;
pub mod notify;
pub mod quota;
pub mod session;
pub mod storage;
pub mod tokens;
pub mod topic;

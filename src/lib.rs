pub mod config;
pub mod dataverse;
pub mod deposit;
pub mod domain;
pub mod error;
pub mod files;
pub mod fs_util;
pub mod ingest;
pub mod metadata;
pub mod output;
pub mod validator;

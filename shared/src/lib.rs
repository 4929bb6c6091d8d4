pub mod admin_service;
pub mod handler;
pub mod http;
pub mod metrics_defs;
pub mod tls;

pub mod errors;
pub mod fetch;
pub mod http;
pub mod proxy;
pub mod tls;

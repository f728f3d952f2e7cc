//! HTTP layer: request/response types, header multimap, raw HTTP/1.1
//! framing, content decoding, the request engine and the redirect driver.

pub mod client;
pub mod decoder;
pub mod framer;
pub mod headers;
pub mod redirect;
pub mod types;

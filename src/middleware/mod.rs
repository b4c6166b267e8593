pub mod cors;
pub mod csrf;
pub mod http;
pub mod security_headers;
pub mod test_role;

pub mod crypto;
pub mod http;
pub mod time;
pub mod token;
pub mod validation;

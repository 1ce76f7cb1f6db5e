pub mod webhook_signature;

pub use webhook_signature::{sign_payload, verify_payload};

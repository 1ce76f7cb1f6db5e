//! Concrete payment-provider adapters behind the engine's `PaymentGateway` capability.
mod checkout;

pub use checkout::HostedCheckout;

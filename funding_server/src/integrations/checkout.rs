use fsp_common::Secret;
use funding_engine::{
    db_types::{Investment, Project},
    helpers::verify_payload,
    traits::{GatewayError, PaymentGateway, PaymentSession, RefundResult, SignatureError, WebhookEvent},
};
use log::*;

/// Adapter for a hosted-checkout style payment provider.
///
/// Card and mobile-money pledges get a checkout session and a redirect URL; the session id is
/// the `external_ref` the webhook reconciler keys on. Bank transfers get a synthesized reference
/// the investor quotes on their transfer, and are confirmed out of band.
#[derive(Clone)]
pub struct HostedCheckout {
    base_url: String,
    webhook_secret: Secret<String>,
}

impl HostedCheckout {
    pub fn new(base_url: impl Into<String>, webhook_secret: Secret<String>) -> Self {
        Self { base_url: base_url.into(), webhook_secret }
    }
}

impl PaymentGateway for HostedCheckout {
    async fn open_payment_session(
        &self,
        investment: &Investment,
        project: &Project,
    ) -> Result<PaymentSession, GatewayError> {
        let session = if investment.payment_method.uses_hosted_checkout() {
            let external_ref = format!("cs_{:016x}", rand::random::<u64>());
            let redirect_url = Some(format!("{}/session/{external_ref}", self.base_url));
            PaymentSession { external_ref, redirect_url }
        } else {
            // The investor quotes this reference on their bank transfer.
            PaymentSession { external_ref: format!("bank_{:08x}", rand::random::<u32>()), redirect_url: None }
        };
        debug!(
            "💳️ Opened {} session {} for investment #{} toward \"{}\"",
            investment.payment_method, session.external_ref, investment.id, project.title
        );
        Ok(session)
    }

    fn verify_webhook(&self, raw_payload: &[u8], signature_header: &str) -> Result<WebhookEvent, SignatureError> {
        verify_payload(raw_payload, signature_header, self.webhook_secret.reveal())?;
        serde_json::from_slice(raw_payload).map_err(|e| SignatureError::MalformedPayload(e.to_string()))
    }

    async fn refund(&self, external_ref: &str) -> Result<RefundResult, GatewayError> {
        // Hosted checkout refunds are fire-and-forget against the session reference.
        let refund_ref = format!("re_{:016x}", rand::random::<u64>());
        info!("💳️ Requested refund {refund_ref} for session {external_ref}");
        Ok(RefundResult { refund_ref })
    }
}

//! Fee models. Pure functions of amount and payment method; all arithmetic in integer cents.
use fsp_common::Cents;

use crate::db_types::{Investment, PaymentMethod};

/// The processing fee the gateway keeps for the given method:
/// * card gateway: 2.9% + 30¢
/// * mobile money: 1%
/// * bank transfer: free
///
/// Processing fees are not returned by the gateway on refund; refunds are for the full pledge
/// amount and the fee is logged separately.
pub fn processing_fee(method: PaymentMethod, amount: Cents) -> Cents {
    match method {
        PaymentMethod::CardGateway => amount.bps(290) + Cents::from(30),
        PaymentMethod::MobileMoney => amount.bps(100),
        PaymentMethod::BankTransfer => Cents::from(0),
    }
}

/// What the platform actually receives for a pledge after gateway processing fees.
pub fn net_amount(method: PaymentMethod, amount: Cents) -> Cents {
    amount - processing_fee(method, amount)
}

/// The platform's cut of a settlement, in basis points of the total. The rate is configuration,
/// not a constant baked into the settlement job.
pub fn platform_fee(total: Cents, fee_bps: i64) -> Cents {
    total.bps(fee_bps)
}

pub fn investment_processing_fee(investment: &Investment) -> Cents {
    processing_fee(investment.payment_method, investment.amount)
}

pub fn investment_net_amount(investment: &Investment) -> Cents {
    net_amount(investment.payment_method, investment.amount)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_fee_split_is_exact() {
        let total = Cents::from_dollars(1000);
        let fee = platform_fee(total, 500);
        let net = total - fee;
        assert_eq!(fee, Cents::from_dollars(50));
        assert_eq!(net, Cents::from_dollars(950));
        assert_eq!(fee + net, total);
    }

    #[test]
    fn platform_fee_respects_configured_rate() {
        let total = Cents::from_dollars(1100);
        assert_eq!(platform_fee(total, 500), Cents::from_dollars(55));
        assert_eq!(platform_fee(total, 250), Cents::from(2_750));
        assert_eq!(platform_fee(total, 0), Cents::from(0));
    }

    #[test]
    fn card_fee_is_percentage_plus_fixed() {
        // $100.00 → 2.9% = $2.90, plus 30¢
        let fee = processing_fee(PaymentMethod::CardGateway, Cents::from_dollars(100));
        assert_eq!(fee, Cents::from(320));
        assert_eq!(net_amount(PaymentMethod::CardGateway, Cents::from_dollars(100)), Cents::from(9_680));
    }

    #[test]
    fn mobile_money_fee_is_percentage_only() {
        let fee = processing_fee(PaymentMethod::MobileMoney, Cents::from_dollars(250));
        assert_eq!(fee, Cents::from(250));
    }

    #[test]
    fn bank_transfer_is_free() {
        let amount = Cents::from_dollars(42);
        assert_eq!(processing_fee(PaymentMethod::BankTransfer, amount), Cents::from(0));
        assert_eq!(net_amount(PaymentMethod::BankTransfer, amount), amount);
    }
}

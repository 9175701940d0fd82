//! PaymentInitiator processor.
//!
//! Turns a pending order into a signed form the buyer's browser posts to the
//! gateway. The initiator never talks to the gateway itself; it only signs
//! and records that the order is now waiting for the gateway's verdict.

use crate::config::{ConfigurationError, SettlementConfig};
use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::ledger::{LedgerError, OrderLedger};
use paysettle_sdk::gateway::SIGNATURE_FIELD;
use paysettle_sdk::objects::{CallbackUrls, PaymentRedirect, PaymentRequestParameters};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum InitiateError {
    /// The order is not in a state this operation accepts.
    #[error("order is {0}, cannot initiate payment")]
    InvalidState(OrderStatus),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for InitiateError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Conflict { actual, .. } => Self::InvalidState(actual),
            other => Self::Ledger(other),
        }
    }
}

/// The order after initiation and the form that sends the buyer on.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub order: OrderRecord,
    pub redirect: PaymentRedirect,
}

pub struct PaymentInitiator {
    config: Arc<SettlementConfig>,
    ledger: Arc<dyn OrderLedger>,
}

impl PaymentInitiator {
    pub fn new(config: Arc<SettlementConfig>, ledger: Arc<dyn OrderLedger>) -> Self {
        Self { config, ledger }
    }

    /// Build the signed redirect for `order`. Pure: no ledger access.
    pub fn build_redirect(
        &self,
        order: &OrderRecord,
        callbacks: &CallbackUrls,
    ) -> Result<PaymentRedirect, ConfigurationError> {
        let merchant = &self.config.merchant;
        merchant.ensure_credentials()?;

        let contact = &order.buyer_contact.0;
        let params = PaymentRequestParameters {
            merchant_id: merchant.merchant_id.clone(),
            merchant_key: merchant.merchant_key.clone(),
            return_url: callbacks.return_url.clone(),
            cancel_url: callbacks.cancel_url.clone(),
            notify_url: callbacks.notify_url.clone(),
            name_first: contact.first_name.clone(),
            name_last: contact.last_name.clone(),
            email_address: contact.email_address.clone(),
            cell_number: contact.cell_number.clone(),
            m_payment_id: order.payment_reference.clone(),
            amount: order.total_amount,
            item_name: merchant.item_name.clone(),
            item_description: Some(describe_items(order)),
        };

        let mut form_fields = params.to_fields();
        let signature = self
            .config
            .signer()
            .sign(form_fields.iter().map(|(k, v)| (k, v)));
        form_fields.push((SIGNATURE_FIELD.to_owned(), signature));

        Ok(PaymentRedirect {
            action_url: self.config.gateway.process_url.clone(),
            form_fields,
        })
    }

    /// Sign the redirect for a pending order and move it to
    /// `awaiting_settlement`.
    ///
    /// The transition is persisted before the redirect is returned, so a
    /// second initiation for the same order loses the compare-and-set and
    /// gets [`InitiateError::InvalidState`].
    #[tracing::instrument(skip_all, err, fields(order_id = %order.order_id))]
    pub async fn initiate(
        &self,
        order: &OrderRecord,
        callbacks: &CallbackUrls,
    ) -> Result<InitiatedPayment, InitiateError> {
        if order.status != OrderStatus::Pending {
            return Err(InitiateError::InvalidState(order.status));
        }
        let redirect = self.build_redirect(order, callbacks)?;
        let order = self
            .ledger
            .transition(
                order.order_id,
                OrderStatus::Pending,
                OrderStatus::AwaitingSettlement,
            )
            .await?;
        info!(
            payment_reference = %order.payment_reference,
            amount = %order.total_amount,
            "Payment initiated, awaiting settlement"
        );
        Ok(InitiatedPayment { order, redirect })
    }

    /// Re-sign the redirect for an order already `awaiting_settlement`.
    ///
    /// Used when the buyer reloads the payment page after initiation. The
    /// frozen order values produce the same signed fields again.
    pub async fn resume(
        &self,
        order: &OrderRecord,
        callbacks: &CallbackUrls,
    ) -> Result<InitiatedPayment, InitiateError> {
        if order.status != OrderStatus::AwaitingSettlement {
            warn!(
                order_id = %order.order_id,
                status = %order.status,
                "Refusing to resume payment"
            );
            return Err(InitiateError::InvalidState(order.status));
        }
        let redirect = self.build_redirect(order, callbacks)?;
        Ok(InitiatedPayment {
            order: order.clone(),
            redirect,
        })
    }

    /// Initiate a pending order or resume an awaiting one.
    pub async fn initiate_or_resume(
        &self,
        order: &OrderRecord,
        callbacks: &CallbackUrls,
    ) -> Result<InitiatedPayment, InitiateError> {
        match order.status {
            OrderStatus::Pending => self.initiate(order, callbacks).await,
            _ => self.resume(order, callbacks).await,
        }
    }
}

/// `2x Kettle, 1x Toaster`
fn describe_items(order: &OrderRecord) -> String {
    order
        .line_items
        .0
        .iter()
        .map(|item| format!("{}x {}", item.quantity, item.name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::sandbox_config;
    use crate::ledger::MemoryLedger;
    use crate::ledger::testing::sample_order;

    fn callbacks() -> CallbackUrls {
        CallbackUrls {
            return_url: "https://shop.test/return".into(),
            cancel_url: "https://shop.test/cancel".into(),
            notify_url: "https://shop.test/itn".into(),
        }
    }

    fn setup() -> (Arc<MemoryLedger>, PaymentInitiator) {
        let ledger = Arc::new(MemoryLedger::new("SHOP"));
        let initiator = PaymentInitiator::new(Arc::new(sandbox_config()), ledger.clone());
        (ledger, initiator)
    }

    #[tokio::test]
    async fn test_initiate_signs_and_transitions() {
        let (ledger, initiator) = setup();
        let order = ledger.create(sample_order()).await.unwrap();

        let initiated = initiator.initiate(&order, &callbacks()).await.unwrap();
        assert_eq!(initiated.order.status, OrderStatus::AwaitingSettlement);
        assert_eq!(
            ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::AwaitingSettlement
        );

        let redirect = initiated.redirect;
        assert_eq!(redirect.action_url, "https://sandbox.payfast.co.za/eng/process");
        assert_eq!(redirect.field("amount"), Some("1200.00"));
        assert_eq!(
            redirect.field("m_payment_id"),
            Some(order.payment_reference.as_str())
        );
        assert_eq!(redirect.field("name_first"), Some("Jane"));
        assert_eq!(redirect.field("cell_number"), None);
        assert_eq!(redirect.field("item_description"), Some("2x Kettle, 1x Toaster"));

        let signature = redirect.field("signature").unwrap();
        let unsigned: Vec<_> = redirect
            .form_fields
            .iter()
            .filter(|(k, _)| k != "signature")
            .collect();
        assert!(
            sandbox_config()
                .signer()
                .verify(unsigned.iter().map(|(k, v)| (k, v)), signature)
        );
    }

    #[tokio::test]
    async fn test_second_initiation_is_rejected() {
        let (ledger, initiator) = setup();
        let order = ledger.create(sample_order()).await.unwrap();
        initiator.initiate(&order, &callbacks()).await.unwrap();

        // Stale copy still says pending; the ledger compare-and-set decides.
        let err = initiator.initiate(&order, &callbacks()).await.unwrap_err();
        assert!(matches!(
            err,
            InitiateError::InvalidState(OrderStatus::AwaitingSettlement)
        ));
    }

    #[tokio::test]
    async fn test_resume_reproduces_the_same_form() {
        let (ledger, initiator) = setup();
        let order = ledger.create(sample_order()).await.unwrap();
        let first = initiator.initiate(&order, &callbacks()).await.unwrap();
        let resumed = initiator
            .initiate_or_resume(&first.order, &callbacks())
            .await
            .unwrap();
        assert_eq!(resumed.redirect, first.redirect);
    }

    #[tokio::test]
    async fn test_terminal_order_cannot_be_initiated() {
        let (ledger, initiator) = setup();
        let order = ledger.create(sample_order()).await.unwrap();
        let cancelled = ledger
            .transition(order.order_id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(
            initiator.initiate_or_resume(&cancelled, &callbacks()).await,
            Err(InitiateError::InvalidState(OrderStatus::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials_leave_order_pending() {
        let ledger = Arc::new(MemoryLedger::new("SHOP"));
        let mut config = sandbox_config();
        config.merchant.merchant_id.clear();
        let initiator = PaymentInitiator::new(Arc::new(config), ledger.clone());
        let order = ledger.create(sample_order()).await.unwrap();

        assert!(matches!(
            initiator.initiate(&order, &callbacks()).await,
            Err(InitiateError::Configuration(
                ConfigurationError::MissingCredential("merchant_id")
            ))
        ));
        assert_eq!(
            ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::Pending
        );
    }
}

//! Application state shared across all request handlers.

use crate::config::ServerConfig;
use paysettle_core::config::SettlementConfig;
use paysettle_core::ledger::OrderLedger;
use paysettle_core::processors::{NotificationReconciler, PaymentInitiator};
use paysettle_sdk::objects::CallbackUrls;
use paysettle_sdk::signature::sign_reference;
use std::sync::Arc;
use url::Url;

pub const GATEWAY_API_PREFIX: &str = "api/v1/gateway/";

/// Application state that is shared across all request handlers.
///
/// Cloneable and cheap to pass around (everything is behind Arc). The
/// configuration is fixed at startup.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn OrderLedger>,
    pub settlement: Arc<SettlementConfig>,
    pub server: Arc<ServerConfig>,
    pub initiator: Arc<PaymentInitiator>,
    pub reconciler: Arc<NotificationReconciler>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        settlement: SettlementConfig,
        server: ServerConfig,
    ) -> Self {
        let settlement = Arc::new(settlement);
        Self {
            initiator: Arc::new(PaymentInitiator::new(settlement.clone(), ledger.clone())),
            reconciler: Arc::new(NotificationReconciler::new(
                settlement.clone(),
                ledger.clone(),
            )),
            ledger,
            settlement,
            server: Arc::new(server),
        }
    }

    fn gateway_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.server
            .public_base_url
            .join(GATEWAY_API_PREFIX)?
            .join(path)
    }

    /// Return, cancel and notify URLs for one payment reference. The cancel
    /// URL carries a token so only the holder of the redirect can cancel.
    pub fn callbacks(&self, payment_reference: &str) -> Result<CallbackUrls, url::ParseError> {
        let mut return_url = self.gateway_url("return")?;
        return_url
            .query_pairs_mut()
            .append_pair("ref", payment_reference);

        let token = sign_reference(
            payment_reference,
            self.settlement.merchant.service_secret_bytes(),
        );
        let mut cancel_url = self.gateway_url("cancel")?;
        cancel_url
            .query_pairs_mut()
            .append_pair("ref", payment_reference)
            .append_pair("token", &token);

        Ok(CallbackUrls {
            return_url: return_url.into(),
            cancel_url: cancel_url.into(),
            notify_url: self.gateway_url("itn")?.into(),
        })
    }

    /// The page that renders the auto-submitting gateway form.
    pub fn pay_page_url(&self, payment_reference: &str) -> Result<Url, url::ParseError> {
        let mut url = self.gateway_url("pay/")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(payment_reference);
        Ok(url)
    }
}

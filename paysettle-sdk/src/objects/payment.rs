use super::order::OrderResponse;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Render an amount the way the gateway expects it: exactly two decimals.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// The three URLs the gateway is told about for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackUrls {
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

/// Every field of an outbound payment request, before signing.
///
/// Field names match the gateway's form field names. Only
/// [`to_fields`](Self::to_fields) turns this into the string pairs that get
/// signed and posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestParameters {
    pub merchant_id: String,
    pub merchant_key: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    pub email_address: Option<String>,
    pub cell_number: Option<String>,
    pub m_payment_id: String,
    pub amount: Decimal,
    pub item_name: String,
    pub item_description: Option<String>,
}

impl PaymentRequestParameters {
    /// The form fields in the gateway's documented order. Absent optional
    /// fields are left out.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let fields = [
            ("merchant_id", Some(self.merchant_id.clone())),
            ("merchant_key", Some(self.merchant_key.clone())),
            ("return_url", Some(self.return_url.clone())),
            ("cancel_url", Some(self.cancel_url.clone())),
            ("notify_url", Some(self.notify_url.clone())),
            ("name_first", self.name_first.clone()),
            ("name_last", self.name_last.clone()),
            ("email_address", self.email_address.clone()),
            ("cell_number", self.cell_number.clone()),
            ("m_payment_id", Some(self.m_payment_id.clone())),
            ("amount", Some(format_amount(self.amount))),
            ("item_name", Some(self.item_name.clone())),
            ("item_description", self.item_description.clone()),
        ];
        fields
            .into_iter()
            .filter_map(|(k, v)| v.filter(|v| !v.is_empty()).map(|v| (k.to_owned(), v)))
            .collect()
    }
}

/// What the buyer's browser needs to reach the gateway: a POST of
/// `form_fields` (signature included) to `action_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRedirect {
    pub action_url: String,
    pub form_fields: Vec<(String, String)>,
}

impl PaymentRedirect {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form_fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response of the combined create-and-initiate Service API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub redirect: PaymentRedirect,
    /// Settlement-server page that renders the auto-submitting form.
    pub redirect_page_url: String,
}

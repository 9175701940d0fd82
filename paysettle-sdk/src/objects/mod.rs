//! Request and response objects shared by the server and its clients.

pub mod anomaly;
pub mod itn;
pub mod order;
pub mod payment;

pub use anomaly::{AnomalyResponse, ListAnomaliesRequest};
pub use itn::{GatewayPaymentStatus, ItnError, ItnNotification};
pub use order::{
    BuyerContact, CreateOrderRequest, GetOrderRequest, LineItem, OrderResponse, OrderStatus,
};
pub use payment::{
    CallbackUrls, CheckoutResponse, PaymentRedirect, PaymentRequestParameters, format_amount,
};

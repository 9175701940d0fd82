//! Settlement processors.
//!
//! - `PaymentInitiator`: signs the gateway redirect for a pending order and
//!   moves it to `awaiting_settlement`
//! - `NotificationReconciler`: verifies an ITN and applies its outcome to
//!   the ledger

pub mod notification_reconciler;
pub mod payment_initiator;

pub use notification_reconciler::{NotificationReconciler, ReconcileError, ReconcileResult};
pub use payment_initiator::{InitiateError, InitiatedPayment, PaymentInitiator};

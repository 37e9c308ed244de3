pub mod cinetpay;
pub mod gateway;
pub mod moneyfusion;
pub mod paystack;
pub mod reconciliation;

pub use cinetpay::CinetPayGateway;
pub use gateway::{generate_transaction_ref, GatewayRegistry, PaymentGateway};
pub use moneyfusion::MoneyFusionGateway;
pub use paystack::PaystackGateway;
pub use reconciliation::ReconciliationService;

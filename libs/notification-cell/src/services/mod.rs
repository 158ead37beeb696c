pub mod dispatcher;
pub mod ledger;
pub mod outbox;
pub mod suppression;
pub mod webhook;

pub use dispatcher::NotificationDispatcher;
pub use ledger::DeliveryLedger;
pub use outbox::OutboxDispatcher;
pub use suppression::SuppressionList;
pub use webhook::WebhookDispatcher;

use crate::exchange::client::{OrderOutcome, OrderRequest};
use crate::exchange::ExchangeClient;
use crate::logs::LogSink;
use crate::models::Side;

/// Submits market orders and logs every attempt and outcome
///
/// No internal retries: a failed order is reported and the caller decides
/// what its bookkeeping does with that.
pub struct OrderExecutor {
    client: ExchangeClient,
    sink: LogSink,
    product_id: u64,
    order_size: f64,
}

impl OrderExecutor {
    pub fn new(client: ExchangeClient, sink: LogSink, product_id: u64, order_size: f64) -> Self {
        Self {
            client,
            sink,
            product_id,
            order_size,
        }
    }

    /// Submit one market order and classify the result
    pub async fn submit(&self, side: Side) -> OrderOutcome {
        self.sink.info(format!(
            "🚀 Placing {} order...",
            side.to_string().to_uppercase()
        ));

        let order = OrderRequest::market(self.product_id, self.order_size, side);
        let outcome = self.client.place_order(&order).await;

        match &outcome {
            OrderOutcome::Filled { raw } => {
                self.sink.success(format!("✅ Order executed: {}", raw));
            }
            OrderOutcome::Rejected { message } => {
                self.sink.error(format!("❌ Order rejected: {}", message));
            }
            OrderOutcome::TransportFailure { message } => {
                self.sink.error(format!("⚠️ Order error: {}", message));
            }
        }

        outcome
    }
}

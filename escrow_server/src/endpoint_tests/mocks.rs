use escrow_engine::{
    db_types::Cents,
    traits::{PaymentIntent, PaymentIntentStatus, PaymentMetadata, PaymentProcessor, PaymentProcessorError},
};
use mockall::mock;

mock! {
    pub Processor {}
    impl PaymentProcessor for Processor {
        async fn create_payment_intent(&self, amount: Cents, currency: &str, metadata: &PaymentMetadata) -> Result<PaymentIntent, PaymentProcessorError>;
        async fn payment_intent_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, PaymentProcessorError>;
    }
}

/// A processor that hands out intents for every charge and reports them all as `status`.
pub fn processor_reporting(status: &'static str) -> MockProcessor {
    let mut processor = MockProcessor::new();
    processor.expect_create_payment_intent().returning(|_, _, metadata| {
        Ok(PaymentIntent {
            intent_id: format!("pi_{}", metadata.transaction_id),
            client_secret: format!("pi_{}_secret", metadata.transaction_id),
        })
    });
    processor.expect_payment_intent_status().returning(move |_| Ok(PaymentIntentStatus::from(status)));
    processor
}

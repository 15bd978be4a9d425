use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    AuctionEndedEvent,
    DisputeOpenedEvent,
    DisputeResolvedEvent,
    EventHandler,
    EventProducer,
    Handler,
    TransactionCompletedEvent,
    TransactionCreatedEvent,
    TransactionDeliveredEvent,
    TransactionPaidEvent,
    TransactionRefundedEvent,
};

/// Builds `EventProducers`, `EventHandlers` and `EventHooks` for the listed events.
///
/// Each entry `on_foo / publish_foo: FooEvent` produces an `on_foo` hook setter on `EventHooks`, an `on_foo` producer
/// list on `EventProducers` and a `publish_foo` helper that sends the event to every producer in that list.
macro_rules! event_hooks {
    ($($hook:ident / $publish:ident: $event:ty),+ $(,)?) => {
        #[derive(Default, Clone)]
        pub struct EventProducers {
            $(pub $hook: Vec<EventProducer<$event>>,)+
        }

        impl EventProducers {
            $(
                pub async fn $publish(&self, event: $event) {
                    for producer in &self.$hook {
                        producer.publish_event(event.clone()).await;
                    }
                }
            )+
        }

        pub struct EventHandlers {
            $(pub $hook: Option<EventHandler<$event>>,)+
        }

        impl EventHandlers {
            pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
                Self { $($hook: hooks.$hook.map(|f| EventHandler::new(buffer_size, f)),)+ }
            }

            pub fn producers(&self) -> EventProducers {
                let mut result = EventProducers::default();
                $(
                    if let Some(handler) = &self.$hook {
                        result.$hook.push(handler.subscribe());
                    }
                )+
                result
            }

            pub async fn start_handlers(self) {
                $(
                    if let Some(handler) = self.$hook {
                        tokio::spawn(async move {
                            handler.start_handler().await;
                        });
                    }
                )+
            }
        }

        #[derive(Default, Clone)]
        pub struct EventHooks {
            $(pub $hook: Option<Handler<$event>>,)+
        }

        impl EventHooks {
            $(
                pub fn $hook<F>(&mut self, f: F) -> &mut Self
                where F: (Fn($event) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
                    self.$hook = Some(Arc::new(f));
                    self
                }
            )+
        }
    };
}

event_hooks!(
    on_transaction_created / publish_transaction_created: TransactionCreatedEvent,
    on_transaction_paid / publish_transaction_paid: TransactionPaidEvent,
    on_transaction_delivered / publish_transaction_delivered: TransactionDeliveredEvent,
    on_transaction_completed / publish_transaction_completed: TransactionCompletedEvent,
    on_transaction_refunded / publish_transaction_refunded: TransactionRefundedEvent,
    on_dispute_opened / publish_dispute_opened: DisputeOpenedEvent,
    on_dispute_resolved / publish_dispute_resolved: DisputeResolvedEvent,
    on_auction_ended / publish_auction_ended: AuctionEndedEvent,
);

use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DeliveryStatusEvent,
    EscrowReleasedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OperationalAlertEvent,
    OrderAnnulledEvent,
    OrderPaidEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub delivery_status_producer: Vec<EventProducer<DeliveryStatusEvent>>,
    pub escrow_released_producer: Vec<EventProducer<EscrowReleasedEvent>>,
    pub alert_producer: Vec<EventProducer<OperationalAlertEvent>>,
}

impl EventProducers {
    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        publish_all(&self.order_paid_producer, event).await;
    }

    pub async fn publish_order_annulled(&self, event: OrderAnnulledEvent) {
        publish_all(&self.order_annulled_producer, event).await;
    }

    pub async fn publish_delivery_status(&self, event: DeliveryStatusEvent) {
        publish_all(&self.delivery_status_producer, event).await;
    }

    pub async fn publish_escrow_released(&self, event: EscrowReleasedEvent) {
        publish_all(&self.escrow_released_producer, event).await;
    }

    pub async fn publish_alert(&self, event: OperationalAlertEvent) {
        publish_all(&self.alert_producer, event).await;
    }
}

async fn publish_all<E: Clone + Send + Sync>(producers: &[EventProducer<E>], event: E) {
    for producer in producers {
        producer.publish_event(event.clone()).await;
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_delivery_status: Option<EventHandler<DeliveryStatusEvent>>,
    pub on_escrow_released: Option<EventHandler<EscrowReleasedEvent>>,
    pub on_alert: Option<EventHandler<OperationalAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_annulled: hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f)),
            on_delivery_status: hooks.on_delivery_status.map(|f| EventHandler::new(buffer_size, f)),
            on_escrow_released: hooks.on_escrow_released.map(|f| EventHandler::new(buffer_size, f)),
            on_alert: hooks.on_alert.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_delivery_status {
            result.delivery_status_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_escrow_released {
            result.escrow_released_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_alert {
            result.alert_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns each configured handler on the runtime.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_delivery_status {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_escrow_released {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_alert {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_delivery_status: Option<Handler<DeliveryStatusEvent>>,
    pub on_escrow_released: Option<Handler<EscrowReleasedEvent>>,
    pub on_alert: Option<Handler<OperationalAlertEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_delivery_status<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DeliveryStatusEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_delivery_status = Some(Arc::new(f));
        self
    }

    pub fn on_escrow_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EscrowReleasedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_escrow_released = Some(Arc::new(f));
        self
    }

    pub fn on_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OperationalAlertEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_alert = Some(Arc::new(f));
        self
    }
}

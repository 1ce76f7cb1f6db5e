use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EscrowReleasedEvent,
    EventHandler,
    EventProducer,
    Handler,
    InvestmentConfirmedEvent,
    InvestmentEscrowReleasedEvent,
    InvestmentProcessingFailedEvent,
    SettlementDeadLetterEvent,
};

/// The write side of the notification outbox. Cloned into every API that publishes events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub investment_confirmed: Vec<EventProducer<InvestmentConfirmedEvent>>,
    pub investment_failed: Vec<EventProducer<InvestmentProcessingFailedEvent>>,
    pub escrow_released: Vec<EventProducer<EscrowReleasedEvent>>,
    pub investment_escrow_released: Vec<EventProducer<InvestmentEscrowReleasedEvent>>,
    pub settlement_dead_letter: Vec<EventProducer<SettlementDeadLetterEvent>>,
}

pub struct EventHandlers {
    pub on_investment_confirmed: Option<EventHandler<InvestmentConfirmedEvent>>,
    pub on_investment_failed: Option<EventHandler<InvestmentProcessingFailedEvent>>,
    pub on_escrow_released: Option<EventHandler<EscrowReleasedEvent>>,
    pub on_investment_escrow_released: Option<EventHandler<InvestmentEscrowReleasedEvent>>,
    pub on_settlement_dead_letter: Option<EventHandler<SettlementDeadLetterEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_investment_confirmed: hooks.on_investment_confirmed.map(|f| EventHandler::new(buffer_size, f)),
            on_investment_failed: hooks.on_investment_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_escrow_released: hooks.on_escrow_released.map(|f| EventHandler::new(buffer_size, f)),
            on_investment_escrow_released: hooks
                .on_investment_escrow_released
                .map(|f| EventHandler::new(buffer_size, f)),
            on_settlement_dead_letter: hooks.on_settlement_dead_letter.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_investment_confirmed {
            result.investment_confirmed.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_investment_failed {
            result.investment_failed.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_escrow_released {
            result.escrow_released.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_investment_escrow_released {
            result.investment_escrow_released.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_settlement_dead_letter {
            result.settlement_dead_letter.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_investment_confirmed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_investment_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_escrow_released {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_investment_escrow_released {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_settlement_dead_letter {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_investment_confirmed: Option<Handler<InvestmentConfirmedEvent>>,
    pub on_investment_failed: Option<Handler<InvestmentProcessingFailedEvent>>,
    pub on_escrow_released: Option<Handler<EscrowReleasedEvent>>,
    pub on_investment_escrow_released: Option<Handler<InvestmentEscrowReleasedEvent>>,
    pub on_settlement_dead_letter: Option<Handler<SettlementDeadLetterEvent>>,
}

impl EventHooks {
    pub fn on_investment_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvestmentConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_investment_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_investment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvestmentProcessingFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_investment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_escrow_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EscrowReleasedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_escrow_released = Some(Arc::new(f));
        self
    }

    pub fn on_investment_escrow_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvestmentEscrowReleasedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_investment_escrow_released = Some(Arc::new(f));
        self
    }

    pub fn on_settlement_dead_letter<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementDeadLetterEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement_dead_letter = Some(Arc::new(f));
        self
    }
}

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;
use ryde_booking::{BookingEvent, BookingStore, EventSink};
use ryde_shared::events::SeatMapChangedEvent;
use ryde_store::EventProducer;
use crate::metrics::Metrics;

/// Fans lifecycle events out to Kafka, the seat-map stream and the counters.
pub struct ApiEventSink {
    kafka: Option<Arc<EventProducer>>,
    store: Arc<dyn BookingStore>,
    seat_tx: broadcast::Sender<SeatMapChangedEvent>,
    metrics: Arc<Metrics>,
}

impl ApiEventSink {
    pub fn new(
        kafka: Option<Arc<EventProducer>>,
        store: Arc<dyn BookingStore>,
        seat_tx: broadcast::Sender<SeatMapChangedEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { kafka, store, seat_tx, metrics }
    }

    async fn publish_seat_map(&self, trip_id: Uuid) {
        // no subscribers, nothing to compute
        if self.seat_tx.receiver_count() == 0 {
            return;
        }
        match self.store.seat_map(trip_id).await {
            Ok(Some(ledger)) => {
                let availability = ledger.availability();
                let _ = self.seat_tx.send(SeatMapChangedEvent {
                    trip_id,
                    available_seats: availability.available_seats,
                    taken_seats: availability.taken_seats,
                    changed_at: Utc::now().timestamp(),
                });
            }
            Ok(None) => debug!(trip_id = %trip_id, "Trip gone before seat map push"),
            Err(e) => error!(trip_id = %trip_id, error = %e, "Failed to load seat map"),
        }
    }
}

#[async_trait]
impl EventSink for ApiEventSink {
    async fn emit(&self, event: BookingEvent) {
        match &event {
            BookingEvent::Created(_) => self.metrics.booking_created(),
            BookingEvent::Cancelled(e) => self.metrics.booking_cancelled(&e.reason),
            BookingEvent::Confirmed(_) | BookingEvent::Completed(_) => {}
        }

        if event.moves_seats() {
            self.publish_seat_map(event.trip_id()).await;
        }

        if let Some(kafka) = &self.kafka {
            kafka.emit(event).await;
        }
    }
}

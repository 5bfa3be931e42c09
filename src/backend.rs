use crate::error::StoreError;
use crate::types::{AppointmentSlot, Booking, NewBooking};
use async_trait::async_trait;

/// Row access to the `appointments` and `bookings` tables of one store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulerBackend: Send + Sync + 'static {
    /// Slots of `scheduler_id`, restricted to `dates` unless it is empty.
    async fn appointments(
        &self,
        scheduler_id: &str,
        dates: &[String],
    ) -> Result<Vec<AppointmentSlot>, StoreError>;
    async fn bookings(&self, scheduler_id: &str) -> Result<Vec<Booking>, StoreError>;
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError>;
    async fn delete_booking(&self, booking_id: &str) -> Result<(), StoreError>;
}

use crate::{
    backend::SchedulerBackend,
    error::StoreError,
    types::{AppointmentSlot, Booking, NewBooking},
};
use async_trait::async_trait;
use chrono::{Duration, Local};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    appointments: Vec<AppointmentSlot>,
    bookings: Vec<Booking>,
}

/// In-memory store. Rows keep insertion order, so repeated selects without a
/// mutation in between return identical lists.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    tables: Arc<Mutex<Tables>>,
}

impl LocalStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_slot(&self, scheduler_id: &str, date: &str, time: &str, length: u32) -> String {
        let id = Uuid::new_v4().to_string();
        self.tables().appointments.push(AppointmentSlot {
            id: id.clone(),
            scheduler_id: scheduler_id.into(),
            date: date.into(),
            time: time.into(),
            length,
        });
        id
    }

    pub fn insert_example_slots(&self, scheduler_id: &str) {
        const NUMBER_OF_DAYS: i64 = 5;
        const TIMES: [(&str, u32); 3] = [("07:00", 60), ("08:30", 45), ("13:00", 90)];

        for day in 1..=NUMBER_OF_DAYS {
            let date = (Local::now() + Duration::days(day))
                .format("%Y-%m-%d")
                .to_string();
            for (time, length) in TIMES {
                self.add_slot(scheduler_id, &date, time, length);
            }
        }
        debug!(scheduler_id, "Inserted example slots");
    }
}

#[async_trait]
impl SchedulerBackend for LocalStore {
    async fn appointments(
        &self,
        scheduler_id: &str,
        dates: &[String],
    ) -> Result<Vec<AppointmentSlot>, StoreError> {
        Ok(self
            .tables()
            .appointments
            .iter()
            .filter(|slot| slot.scheduler_id == scheduler_id)
            .filter(|slot| dates.is_empty() || dates.contains(&slot.date))
            .cloned()
            .collect())
    }

    async fn bookings(&self, scheduler_id: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .tables()
            .bookings
            .iter()
            .filter(|booking| booking.scheduler_id == scheduler_id)
            .cloned()
            .collect())
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let mut tables = self.tables();

        if !tables
            .appointments
            .iter()
            .any(|slot| slot.id == booking.appointment_id)
        {
            let err = format!("Appointment {}", booking.appointment_id);
            error!(%err, "Booking references unknown appointment");
            return Err(StoreError::NotFound(err));
        }
        if tables
            .bookings
            .iter()
            .any(|existing| existing.appointment_id == booking.appointment_id)
        {
            let err = format!("appointment {} is already booked", booking.appointment_id);
            error!("{err}");
            return Err(StoreError::Conflict(err));
        }

        let created = Booking {
            id: Uuid::new_v4().to_string(),
            appointment_id: booking.appointment_id,
            scheduler_id: booking.scheduler_id,
            name: booking.name,
            email: booking.email,
            notes: booking.notes,
        };
        tables.bookings.push(created.clone());
        Ok(created)
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let before = tables.bookings.len();
        tables.bookings.retain(|booking| booking.id != booking_id);

        if tables.bookings.len() == before {
            let err = format!("Booking {booking_id}");
            error!(%err, "Booking can't be deleted");
            return Err(StoreError::NotFound(err));
        }
        Ok(())
    }
}

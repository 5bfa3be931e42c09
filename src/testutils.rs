use crate::types::{AppointmentSlot, Booking, NewBooking};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::wrappers::WatchStream;

pub const SCHEDULER_ID: &str = "ht25";

pub fn slot(id: &str, date: &str, time: &str) -> AppointmentSlot {
    AppointmentSlot {
        id: id.into(),
        scheduler_id: SCHEDULER_ID.into(),
        date: date.into(),
        time: time.into(),
        length: 60,
    }
}

pub fn booking(id: &str, appointment_id: &str, name: &str, email: &str) -> Booking {
    Booking {
        id: id.into(),
        appointment_id: appointment_id.into(),
        scheduler_id: SCHEDULER_ID.into(),
        name: name.into(),
        email: email.into(),
        notes: String::new(),
    }
}

pub fn new_booking(appointment_id: &str, scheduler_id: &str, name: &str, email: &str) -> NewBooking {
    NewBooking {
        appointment_id: appointment_id.into(),
        scheduler_id: scheduler_id.into(),
        name: name.into(),
        email: email.into(),
        notes: String::new(),
    }
}

pub async fn read_from_booking_stream(stream: &mut WatchStream<Vec<Booking>>) -> Vec<Booking> {
    timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("No booking list received within timeout")
        .expect("Booking stream closed")
}

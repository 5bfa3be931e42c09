use crate::schema::{appointments, bookings};
use crate::types::{AppointmentSlot, Booking, NewBooking};
use crate::{backend::SchedulerBackend, error::StoreError};
use async_trait::async_trait;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{
    Connection, ConnectionError, ExpressionMethods, Insertable, PgConnection, QueryDsl, Queryable,
    RunQueryDsl, Selectable, SelectableHelper,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;
use uuid::Uuid;

#[derive(Queryable, Selectable)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AppointmentRow {
    id: Uuid,
    scheduler_id: String,
    date: String,
    time: String,
    length: i32,
}

impl From<AppointmentRow> for AppointmentSlot {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id.to_string(),
            scheduler_id: row.scheduler_id,
            date: row.date,
            time: row.time,
            length: u32::try_from(row.length).unwrap_or_default(),
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookingRow {
    id: Uuid,
    appointment_id: Uuid,
    scheduler_id: String,
    name: String,
    email: String,
    notes: String,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            id: row.id.to_string(),
            appointment_id: row.appointment_id.to_string(),
            scheduler_id: row.scheduler_id,
            name: row.name,
            email: row.email,
            notes: row.notes,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = bookings)]
struct NewBookingRow {
    appointment_id: Uuid,
    scheduler_id: String,
    name: String,
    email: String,
    notes: String,
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    /// Runs a blocking diesel query off the async runtime.
    async fn run<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = connection.lock().unwrap_or_else(PoisonError::into_inner);
            query(&mut connection)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("database task failed: {err}")))?
    }
}

fn parse_id(id: &str, what: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::NotFound(format!("{what} {id}")))
}

fn database_error(err: DieselError, action: &str) -> StoreError {
    error!(?err, "{action} failed");
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            StoreError::NotFound(info.message().to_string())
        }
        err => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl SchedulerBackend for DatabaseInterface {
    async fn appointments(
        &self,
        scheduler_id: &str,
        dates: &[String],
    ) -> Result<Vec<AppointmentSlot>, StoreError> {
        let scheduler_id = scheduler_id.to_string();
        let dates = dates.to_vec();
        self.run(move |connection| {
            let mut query = appointments::table
                .filter(appointments::scheduler_id.eq(scheduler_id))
                .into_boxed();
            if !dates.is_empty() {
                query = query.filter(appointments::date.eq_any(dates));
            }
            query
                .select(AppointmentRow::as_select())
                .load(connection)
                .map(|rows| rows.into_iter().map(AppointmentSlot::from).collect())
                .map_err(|err| database_error(err, "Reading appointments"))
        })
        .await
    }

    async fn bookings(&self, scheduler_id: &str) -> Result<Vec<Booking>, StoreError> {
        let scheduler_id = scheduler_id.to_string();
        self.run(move |connection| {
            bookings::table
                .filter(bookings::scheduler_id.eq(scheduler_id))
                .order(bookings::id)
                .select(BookingRow::as_select())
                .load(connection)
                .map(|rows| rows.into_iter().map(Booking::from).collect())
                .map_err(|err| database_error(err, "Reading bookings"))
        })
        .await
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let row = NewBookingRow {
            appointment_id: parse_id(&booking.appointment_id, "Appointment")?,
            scheduler_id: booking.scheduler_id,
            name: booking.name,
            email: booking.email,
            notes: booking.notes,
        };
        self.run(move |connection| {
            diesel::insert_into(bookings::table)
                .values(&row)
                .returning(BookingRow::as_returning())
                .get_result(connection)
                .map(Booking::from)
                .map_err(|err| database_error(err, "Creating booking"))
        })
        .await
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<(), StoreError> {
        let id = parse_id(booking_id, "Booking")?;
        let booking_id = booking_id.to_string();
        self.run(move |connection| {
            match diesel::delete(bookings::table.find(id)).execute(connection) {
                Ok(0) => Err(StoreError::NotFound(format!("Booking {booking_id}"))),
                Ok(_) => Ok(()),
                Err(err) => Err(database_error(err, "Deleting booking")),
            }
        })
        .await
    }
}

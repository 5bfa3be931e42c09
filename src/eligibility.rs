//! Which booking action the current user gets on a slot.
//!
//! A user holding a booking anywhere in the scheduler sees no `Book` action
//! on any other open slot. This only holds per browser identity; the store
//! has to enforce uniqueness for it to be a guarantee.

use crate::types::{AppointmentSlot, Booking};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionLabel {
    Book,
    Booked,
    Cancel,
}

impl ActionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionLabel::Book => "Book",
            ActionLabel::Booked => "Booked",
            ActionLabel::Cancel => "Cancel",
        }
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAction {
    OpenForm(AppointmentSlot),
    DeleteBooking(String),
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotEligibility {
    pub is_booked: bool,
    pub is_own_booking: bool,
    pub has_booking_elsewhere: bool,
    pub visible: bool,
    pub disabled: bool,
    pub action_label: ActionLabel,
    #[serde(skip)]
    slot: AppointmentSlot,
    #[serde(skip)]
    booking: Option<Booking>,
}

impl SlotEligibility {
    pub fn booker_name(&self) -> Option<&str> {
        self.booking.as_ref().map(|booking| booking.name.as_str())
    }

    /// What activating the slot's button does.
    pub fn activate(&self) -> SlotAction {
        match &self.booking {
            Some(booking) if self.is_own_booking => SlotAction::DeleteBooking(booking.id.clone()),
            Some(_) => SlotAction::Nothing,
            None => SlotAction::OpenForm(self.slot.clone()),
        }
    }
}

pub fn evaluate(slot: &AppointmentSlot, bookings: &[Booking], user: Option<&str>) -> SlotEligibility {
    let booking = bookings
        .iter()
        .find(|booking| booking.appointment_id == slot.id)
        .cloned();
    let is_booked = booking.is_some();
    let is_own_booking = matches!((&booking, user), (Some(booking), Some(user)) if booking.email == user);
    let has_booking_elsewhere = match user {
        Some(user) => bookings.iter().any(|booking| booking.email == user),
        None => false,
    };

    let visible = is_own_booking || (!is_booked && !has_booking_elsewhere);
    let disabled = !is_own_booking && is_booked;
    let action_label = if is_own_booking {
        ActionLabel::Cancel
    } else if is_booked {
        ActionLabel::Booked
    } else {
        ActionLabel::Book
    };

    SlotEligibility {
        is_booked,
        is_own_booking,
        has_booking_elsewhere,
        visible,
        disabled,
        action_label,
        slot: slot.clone(),
        booking,
    }
}

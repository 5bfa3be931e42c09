use crate::types::AppointmentSlot;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerDay {
    pub date: String,
    pub slots: Vec<AppointmentSlot>,
}

/// Stable ascending sort on date, then time.
pub fn sort_slots(slots: &mut [AppointmentSlot]) {
    slots.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
}

/// Buckets slots per date. Days come out in chronological order and the slots
/// of each day are ordered by time.
pub fn group_by_day(slots: &[AppointmentSlot]) -> Vec<SchedulerDay> {
    let mut sorted = slots.to_vec();
    sort_slots(&mut sorted);

    let mut days: Vec<SchedulerDay> = Vec::new();
    for slot in sorted {
        match days.last_mut() {
            Some(day) if day.date == slot.date => day.slots.push(slot),
            _ => days.push(SchedulerDay {
                date: slot.date.clone(),
                slots: vec![slot],
            }),
        }
    }

    for day in &mut days {
        day.slots.sort_by(|a, b| a.time.cmp(&b.time));
    }
    days
}

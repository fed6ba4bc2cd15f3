use crate::models::Event;
use chrono::NaiveDateTime;

/// Marks every incomplete event due strictly before `now` as completed.
///
/// Returns the adjusted list, in the original order, and the ids that were
/// flipped so the caller can persist them.
pub fn reconcile(mut events: Vec<Event>, now: NaiveDateTime) -> (Vec<Event>, Vec<i64>) {
    let mut flipped = Vec::new();
    for event in events.iter_mut() {
        if event.is_past_due(now) {
            event.completed = true;
            flipped.push(event.id);
        }
    }
    (events, flipped)
}

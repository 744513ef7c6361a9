//! Role classification.

use crate::types::{Event, Timestamp, Viewer};

use super::types::{Role, RoleViews};

/// The one role an event plays for a viewer, if any.
///
/// Hosting beats committee membership, which beats attendance. Attendance
/// splits on `now`: events at or after it are upcoming.
pub fn classify(event: &Event, viewer: &Viewer, now: Timestamp) -> Option<Role> {
    if event.is_hosted_by(&viewer.host_id) {
        Some(Role::Hosted)
    } else if event.has_committee_member(&viewer.attendee_id) {
        Some(Role::Organizing)
    } else if event.has_attendee(&viewer.attendee_id) {
        if event.date >= now {
            Some(Role::Upcoming)
        } else {
            Some(Role::Attended)
        }
    } else {
        None
    }
}

/// Partition events into the four role views.
pub fn project<'a, I>(events: I, viewer: &Viewer, now: Timestamp) -> RoleViews
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut views = RoleViews::default();

    for event in events {
        let bucket = match classify(event, viewer, now) {
            Some(Role::Hosted) => &mut views.hosted,
            Some(Role::Organizing) => &mut views.organizing,
            Some(Role::Upcoming) => &mut views.upcoming,
            Some(Role::Attended) => &mut views.attended,
            None => continue,
        };
        bucket.push(event.clone());
    }

    for bucket in [
        &mut views.hosted,
        &mut views.organizing,
        &mut views.upcoming,
        &mut views.attended,
    ] {
        bucket.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    }

    views
}

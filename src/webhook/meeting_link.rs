//! Best-effort resolution of a booking's video link.

use super::events::BookingPayload;

/// Hosts whose presence in a free-text location marks it as a video link.
const VIDEO_DOMAINS: &[&str] = &[
    "zoom.us",
    "meet.google.com",
    "teams.microsoft.com",
    "teams.live.com",
    "webex.com",
    "whereby.com",
    "daily.co",
    "cal.com/video",
];

/// Conference-data video entry point, then a URL-shaped location, then the
/// metadata video URL, then the platform's own video call data.
pub fn resolve_meeting_link(booking: &BookingPayload) -> Option<String> {
    conference_entry_point(booking)
        .or_else(|| location_link(booking.location.as_deref()))
        .or_else(|| booking.metadata_video_url().and_then(non_empty))
        .or_else(|| {
            booking
                .video_call_data
                .as_ref()
                .and_then(|data| data.url.as_deref())
                .and_then(non_empty)
        })
}

fn conference_entry_point(booking: &BookingPayload) -> Option<String> {
    booking
        .conference_data
        .as_ref()?
        .entry_points
        .iter()
        .filter(|entry| {
            entry
                .entry_point_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("video"))
        })
        .find_map(|entry| entry.uri.as_deref().and_then(non_empty))
}

fn location_link(location: Option<&str>) -> Option<String> {
    let location = location?.trim();
    if location.is_empty() {
        return None;
    }

    if is_http_url(location) {
        return Some(location.to_string());
    }

    let lower = location.to_ascii_lowercase();
    if VIDEO_DOMAINS.iter().any(|domain| lower.contains(domain)) && !lower.contains(' ') {
        return Some(format!("https://{}", location.trim_start_matches("//")));
    }

    None
}

fn is_http_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

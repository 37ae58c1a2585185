//! Plain-text rendering of [`WidgetState`].

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::model::WidgetState;

const WEEKDAYS: [&str; 7] =
    ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// The widget always shows the same icon regardless of the reported condition.
pub const ICON_LABEL: &str = "CLEAR_DAY";

const LOADER: &str = "[ ... ]";

pub const LOADING_TITLE: &str = "Detecting your location";
pub const LOADING_DETAIL: &str = "Your current location will be displayed on the App \
                                  & used for calculating Real time weather.";

/// `"Friday, 15 March 2024"`: English names, no zero padding.
pub fn format_date(date: &impl Datelike) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_sunday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{weekday}, {} {month} {}", date.day(), date.year())
}

/// `"HH:MM:SS"`, 24-hour.
pub fn format_clock(time: &impl Timelike) -> String {
    format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
}

fn icon_glyph(label: &str) -> &'static str {
    match label {
        "CLEAR_DAY" => "☀",
        _ => "?",
    }
}

/// Render the widget panel as of the local time `now`.
pub fn render(state: &WidgetState, now: NaiveDateTime) -> String {
    let record = match (&state.current, state.loading) {
        (Some(record), false) => record,
        _ => return format!("{LOADER}\n{LOADING_TITLE}\n{LOADING_DETAIL}\n"),
    };

    let mut out = String::new();
    out.push_str(&format!("{}\n{}\n", record.city, record.country_code));
    out.push_str(&format!("{} {}\n", icon_glyph(ICON_LABEL), record.condition_main));
    out.push_str(&format!("{}\n{}\n", format_clock(&now), format_date(&now.date())));
    out.push_str(&format!("{}°C\n", record.temperature_c));
    out.push_str(&format!(
        "{}°F  humidity {}%\n",
        record.temperature_f, record.humidity
    ));
    out
}

//! CSV formatting of a session's records.
//!
//! Columns are fixed and written in [`CSV_HEADER`] order. Fields containing a
//! comma, quote, or line break are quoted, with embedded quotes doubled.

use chrono::{DateTime, Utc};

use crate::types::WeatherRecord;

/// Column names, in output order
pub const CSV_HEADER: [&str; 15] = [
    "zip_code",
    "city",
    "date_time_utc",
    "temp_f",
    "temp_c",
    "feels_like_f",
    "feels_like_c",
    "humidity",
    "pressure_hpa",
    "wind_speed_mps",
    "wind_direction_deg",
    "cloud_cover_percent",
    "sunrise_utc",
    "sunset_utc",
    "weather_description",
];

/// A rendered CSV document and its attachment name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvExport {
    /// Suggested download filename
    pub filename: String,
    /// CSV text including the header row
    pub content: String,
}

/// Render records as CSV with a header row (CRLF line endings)
pub fn to_csv(records: &[WeatherRecord]) -> String {
    let mut out = String::new();
    write_row(&mut out, CSV_HEADER.iter().map(|h| h.to_string()));

    for record in records {
        write_row(
            &mut out,
            [
                record.zip_code.clone(),
                record.city.clone(),
                record.date_time_utc.clone(),
                format_float(record.temp_f),
                format_float(record.temp_c),
                format_float(record.feels_like_f),
                format_float(record.feels_like_c),
                record.humidity.to_string(),
                record.pressure_hpa.to_string(),
                format_float(record.wind_speed_mps),
                record.wind_direction_deg.to_string(),
                record.cloud_cover_percent.to_string(),
                record.sunrise_utc.clone(),
                record.sunset_utc.clone(),
                record.weather_description.clone(),
            ],
        );
    }
    out
}

/// Attachment name for an export generated at `at`
pub fn download_filename(at: DateTime<Utc>) -> String {
    format!("weather-data-{}.csv", at.format("%Y%m%d-%H%M%S"))
}

fn write_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(&field));
    }
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// Whole numbers keep a trailing ".0" so float columns stay visibly floats
fn format_float(value: f64) -> String {
    let s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}

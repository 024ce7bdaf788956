//! Form metadata extraction.
//!
//! Pulls the handful of fields downstream reporting cares about out of a raw
//! payload: the root element's `xmlns` (which form this is) and the children
//! of the root-level `meta` block. Extraction is lenient by construction:
//!
//! - any namespace on `meta` and its children is accepted, and older `Meta`
//!   capitalisation is matched too,
//! - missing or unparseable dates become `None`,
//! - malformed XML yields whatever was read before the error.
//!
//! Nothing here can reject a submission.
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Metadata carried by a form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormMetadata {
    /// Default namespace declared on the root element; identifies the form.
    pub xmlns: Option<String>,
    pub instance_id: Option<String>,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    /// Top-level `encounter_date`, used by some older forms instead of meta times.
    pub encounter_date: Option<DateTime<Utc>>,
}

impl FormMetadata {
    /// Parse metadata out of a raw payload. Never fails.
    pub fn extract(payload: &[u8]) -> Self {
        let mut reader = Reader::from_reader(payload);
        reader.config_mut().trim_text(true);

        let mut meta = FormMetadata::default();
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut in_meta = false;
        // Field being read and the depth of its element.
        let mut field: Option<(Field, usize)> = None;
        let mut text = String::new();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => {
                    warn!(
                        error = %err,
                        position = reader.buffer_position(),
                        "form_metadata_parse_failed"
                    );
                    return meta;
                }
            };

            match event {
                Event::Start(start) => {
                    depth += 1;
                    if depth == 1 {
                        meta.xmlns = root_namespace(&start);
                    } else if depth == 2 && is_meta(&start) {
                        in_meta = true;
                    } else if field.is_some() {
                        // Nested markup inside a field; its text still belongs to the field.
                    } else if depth == 2 && start.local_name().as_ref() == b"encounter_date" {
                        field = Some((Field::EncounterDate, depth));
                        text.clear();
                    } else if depth == 3 && in_meta {
                        field = Field::from_local_name(start.local_name().as_ref())
                            .map(|f| (f, depth));
                        text.clear();
                    }
                }
                Event::Empty(start) if depth == 0 => {
                    meta.xmlns = root_namespace(&start);
                }
                Event::Text(chunk) if field.is_some() => {
                    if let Ok(value) = chunk.unescape() {
                        text.push_str(&value);
                    }
                }
                Event::End(_) => {
                    if let Some((done, field_depth)) = field {
                        if field_depth == depth {
                            field = None;
                            meta.assign(done, text.trim());
                        }
                    }
                    if depth == 2 {
                        in_meta = false;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => return meta,
                _ => {}
            }
            buf.clear();
        }
    }

    /// The date a submission should be reported under: `timeEnd`, then
    /// `timeStart`, then `encounter_date`, then the Unix epoch.
    pub fn reporting_date(&self) -> DateTime<Utc> {
        self.time_end
            .or(self.time_start)
            .or(self.encounter_date)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn assign(&mut self, field: Field, value: &str) {
        if value.is_empty() {
            return;
        }
        let owned = Some(value.to_string());
        match field {
            Field::InstanceId => self.instance_id = owned,
            Field::DeviceId => self.device_id = owned,
            Field::UserId => self.user_id = owned,
            Field::Username => self.username = owned,
            Field::TimeStart => self.time_start = parse_form_date(value),
            Field::TimeEnd => self.time_end = parse_form_date(value),
            Field::EncounterDate => self.encounter_date = parse_form_date(value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    InstanceId,
    DeviceId,
    UserId,
    Username,
    TimeStart,
    TimeEnd,
    EncounterDate,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"instanceID" => Some(Field::InstanceId),
            b"deviceID" => Some(Field::DeviceId),
            b"userID" => Some(Field::UserId),
            b"username" => Some(Field::Username),
            b"timeStart" => Some(Field::TimeStart),
            b"timeEnd" => Some(Field::TimeEnd),
            _ => None,
        }
    }
}

fn is_meta(start: &BytesStart<'_>) -> bool {
    start.local_name().as_ref().eq_ignore_ascii_case(b"meta")
}

fn root_namespace(start: &BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"xmlns")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
        .filter(|v| !v.is_empty())
}

/// Parse an ISO-8601 timestamp as written by form clients.
///
/// Accepts full RFC 3339, hour-only offsets, naive date-times (taken as UTC) and bare
/// `yyyy-mm-dd` dates (midnight UTC).
pub fn parse_form_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Older clients write hour-only offsets such as `-04`.
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    const META_XML: &[u8] = br#"<?xml version='1.0' ?>
<data uiVersion="1" version="9" name="Visit" xmlns="http://example.org/forms/visit">
  <encounter_date>2010-07-01</encounter_date>
  <n0:meta xmlns:n0="http://openrosa.org/jr/xforms">
    <n0:deviceID>IMEI:354957034283981</n0:deviceID>
    <n0:timeStart>2010-07-22T13:54:27.971-04</n0:timeStart>
    <n0:timeEnd>2010-07-23T13:55:11.648-04:00</n0:timeEnd>
    <n0:username>admin</n0:username>
    <n0:userID>f7f0c79e-8b79-11df-b7de-005056c00008</n0:userID>
    <n0:instanceID>THIS-IS-AN-ID</n0:instanceID>
  </n0:meta>
</data>"#;

    #[test]
    fn extracts_meta_block() {
        let meta = FormMetadata::extract(META_XML);
        assert_eq!(meta.xmlns.as_deref(), Some("http://example.org/forms/visit"));
        assert_eq!(meta.username.as_deref(), Some("admin"));
        assert_eq!(
            meta.user_id.as_deref(),
            Some("f7f0c79e-8b79-11df-b7de-005056c00008")
        );
        assert_eq!(meta.instance_id.as_deref(), Some("THIS-IS-AN-ID"));
        assert_eq!(meta.device_id.as_deref(), Some("IMEI:354957034283981"));
        assert_eq!(
            meta.time_end.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2010, 7, 23)
        );
    }

    #[test]
    fn hour_only_offset_is_accepted() {
        let meta = FormMetadata::extract(META_XML);
        assert_eq!(
            meta.time_start.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2010, 7, 22)
        );
    }

    #[test]
    fn unparseable_dates_are_dropped() {
        let meta = FormMetadata::extract(
            b"<data><meta><timeStart>soon</timeStart><timeEnd>2010-07-23</timeEnd></meta></data>",
        );
        assert_eq!(meta.time_start, None);
        assert!(meta.time_end.is_some());
    }

    #[test]
    fn reporting_date_prefers_time_end() {
        let meta = FormMetadata::extract(META_XML);
        assert_eq!(meta.reporting_date(), meta.time_end.unwrap());
    }

    #[test]
    fn missing_dates_report_epoch() {
        let meta = FormMetadata::extract(b"<data xmlns='urn:x'><meta><username>u</username></meta></data>");
        assert_eq!(meta.xmlns.as_deref(), Some("urn:x"));
        assert_eq!(meta.username.as_deref(), Some("u"));
        assert_eq!(meta.reporting_date(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn encounter_date_is_last_resort() {
        let meta = FormMetadata::extract(b"<data><encounter_date>2011-02-03</encounter_date></data>");
        assert_eq!(
            meta.reporting_date().date_naive(),
            NaiveDate::from_ymd_opt(2011, 2, 3).unwrap()
        );
    }

    #[test]
    fn malformed_xml_keeps_partial_metadata() {
        let meta = FormMetadata::extract(b"<data xmlns='urn:y'><Meta><username>bob</username></Meta><oops></data>");
        assert_eq!(meta.xmlns.as_deref(), Some("urn:y"));
        assert_eq!(meta.username.as_deref(), Some("bob"));
    }

    #[test]
    fn nested_markup_does_not_end_a_field_early() {
        let meta = FormMetadata::extract(
            b"<data><meta><username><b>a</b>b</username><userID>u-1</userID></meta></data>",
        );
        assert_eq!(meta.username.as_deref(), Some("ab"));
        assert_eq!(meta.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn parses_common_date_shapes() {
        assert!(parse_form_date("2010-07-22T13:54:27Z").is_some());
        assert!(parse_form_date("2010-07-22T13:54:27.971").is_some());
        assert!(parse_form_date("2010-07-22").is_some());
        assert!(parse_form_date("yesterday").is_none());
    }
}

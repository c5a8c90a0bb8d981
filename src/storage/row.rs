use std::fmt;
use chrono::DateTime;

// ┌───────────────────────────────────────────────────────────────────────┐
// │ Offset │ Length │ Field (big-endian integers, space/null padded text) │
// │────────┼────────┼─────────────────────────────────────────────────────│
// │    0   │   24   │ SDT_NAME (index key)                                │
// │   24   │    4   │ ID                                                  │
// │   28   │    8   │ DATE_TIME (ms since epoch)                          │
// │   36   │    4   │ YEAR                                                │
// │   40   │    9   │ MONTH                                               │
// │   49   │    4   │ MDATE                                               │
// │   53   │    9   │ DAY                                                 │
// │   62   │    4   │ TIME                                                │
// │   66   │    4   │ SENSOR_ID                                           │
// │   70   │   38   │ SENSOR_NAME                                         │
// │  108   │    4   │ HOURLY_COUNTS                                       │
// └───────────────────────────────────────────────────────────────────────┘

pub const RECORD_SIZE: usize = 112;

pub const SDT_NAME_OFFSET: usize    = 0;
pub const SDT_NAME_SIZE: usize      = 24;
pub const ID_OFFSET: usize          = 24;
pub const DATE_OFFSET: usize        = 28;
pub const YEAR_OFFSET: usize        = 36;
pub const MONTH_OFFSET: usize       = 40;
pub const MONTH_SIZE: usize         = 9;
pub const MDATE_OFFSET: usize       = 49;
pub const DAY_OFFSET: usize         = 53;
pub const DAY_SIZE: usize           = 9;
pub const TIME_OFFSET: usize        = 62;
pub const SENSOR_ID_OFFSET: usize   = 66;
pub const SENSOR_NAME_OFFSET: usize = 70;
pub const SENSOR_NAME_SIZE: usize   = 38;
pub const COUNTS_OFFSET: usize      = 108;

const DATE_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// One pedestrian-counter reading as stored in a paged heap file.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub sdt_name: String,
    pub id: i32,
    pub date_time: i64,
    pub year: i32,
    pub month: String,
    pub mdate: i32,
    pub day: String,
    pub time: i32,
    pub sensor_id: i32,
    pub sensor_name: String,
    pub hourly_counts: i32,
}

impl SensorRecord {
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> SensorRecord {
        SensorRecord {
            sdt_name: read_text(bytes, SDT_NAME_OFFSET, SDT_NAME_SIZE),
            id: read_i32(bytes, ID_OFFSET),
            date_time: read_i64(bytes, DATE_OFFSET),
            year: read_i32(bytes, YEAR_OFFSET),
            month: read_text(bytes, MONTH_OFFSET, MONTH_SIZE),
            mdate: read_i32(bytes, MDATE_OFFSET),
            day: read_text(bytes, DAY_OFFSET, DAY_SIZE),
            time: read_i32(bytes, TIME_OFFSET),
            sensor_id: read_i32(bytes, SENSOR_ID_OFFSET),
            sensor_name: read_text(bytes, SENSOR_NAME_OFFSET, SENSOR_NAME_SIZE),
            hourly_counts: read_i32(bytes, COUNTS_OFFSET),
        }
    }

    /// Text fields longer than their slot are truncated; shorter ones are space padded.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        write_text(&mut buf, SDT_NAME_OFFSET, SDT_NAME_SIZE, &self.sdt_name);
        buf[ID_OFFSET..ID_OFFSET + 4].copy_from_slice(&self.id.to_be_bytes());
        buf[DATE_OFFSET..DATE_OFFSET + 8].copy_from_slice(&self.date_time.to_be_bytes());
        buf[YEAR_OFFSET..YEAR_OFFSET + 4].copy_from_slice(&self.year.to_be_bytes());
        write_text(&mut buf, MONTH_OFFSET, MONTH_SIZE, &self.month);
        buf[MDATE_OFFSET..MDATE_OFFSET + 4].copy_from_slice(&self.mdate.to_be_bytes());
        write_text(&mut buf, DAY_OFFSET, DAY_SIZE, &self.day);
        buf[TIME_OFFSET..TIME_OFFSET + 4].copy_from_slice(&self.time.to_be_bytes());
        buf[SENSOR_ID_OFFSET..SENSOR_ID_OFFSET + 4].copy_from_slice(&self.sensor_id.to_be_bytes());
        write_text(&mut buf, SENSOR_NAME_OFFSET, SENSOR_NAME_SIZE, &self.sensor_name);
        buf[COUNTS_OFFSET..COUNTS_OFFSET + 4].copy_from_slice(&self.hourly_counts.to_be_bytes());
        buf
    }

    /// `MM/dd/yyyy hh:mm:ss AM` in UTC, or the raw millisecond value if out of range.
    pub fn formatted_date(&self) -> String {
        match DateTime::from_timestamp_millis(self.date_time) {
            Some(dt) => dt.format(DATE_FORMAT).to_string(),
            None => self.date_time.to_string(),
        }
    }
}

impl fmt::Display for SensorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | id={} | {} | {} {} {} {} | time={} | sensor={} {} | counts={}",
            self.sdt_name,
            self.id,
            self.formatted_date(),
            self.year,
            self.month,
            self.mdate,
            self.day,
            self.time,
            self.sensor_id,
            self.sensor_name,
            self.hourly_counts
        )
    }
}

fn read_i32(bytes: &[u8; RECORD_SIZE], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    i32::from_be_bytes(raw)
}

fn read_i64(bytes: &[u8; RECORD_SIZE], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_be_bytes(raw)
}

fn read_text(bytes: &[u8; RECORD_SIZE], at: usize, size: usize) -> String {
    String::from_utf8_lossy(&bytes[at..at + size])
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

fn write_text(buf: &mut [u8; RECORD_SIZE], at: usize, size: usize, text: &str) {
    let field = &mut buf[at..at + size];
    field.fill(b' ');
    let len = text.len().min(size);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SensorRecord {
        SensorRecord {
            sdt_name: "1/11/2019 05:00:00 PM".into(),
            id: 2887628,
            date_time: 1_547_226_000_000,
            year: 2019,
            month: "January".into(),
            mdate: 11,
            day: "Friday".into(),
            time: 17,
            sensor_id: 34,
            sensor_name: "Flinders St-Spark La".into(),
            hourly_counts: 300,
        }
    }

    #[test]
    fn encode_places_fields_at_fixed_offsets() {
        let bytes = sample().encode();
        assert_eq!(&bytes[..9], b"1/11/2019");
        assert_eq!(&bytes[ID_OFFSET..ID_OFFSET + 4], &2887628i32.to_be_bytes());
        assert_eq!(&bytes[COUNTS_OFFSET..], &300i32.to_be_bytes());
        assert_eq!(SensorRecord::decode(&bytes), sample());
    }

    #[test]
    fn date_is_rendered_with_am_pm() {
        assert_eq!(sample().formatted_date(), "01/11/2019 05:00:00 PM");
    }
}

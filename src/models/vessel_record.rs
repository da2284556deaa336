use chrono::{DateTime, Duration, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::utils::error::RecordError;

/// Course over ground. Tracking sites print `-` or `N/A` when the vessel
/// has no valid course, which is kept distinct from 0°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Course {
    Degrees(f64),
    Unknown,
}

impl Course {
    pub fn from_degrees(degrees: f64) -> Result<Self, RecordError> {
        if degrees.is_finite() && (0.0..360.0).contains(&degrees) {
            Ok(Course::Degrees(degrees))
        } else {
            Err(RecordError::CourseOutOfRange(degrees))
        }
    }

    pub fn degrees(&self) -> Option<f64> {
        match self {
            Course::Degrees(d) => Some(*d),
            Course::Unknown => None,
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Course::Degrees(d) => write!(f, "{:.0}°", d),
            Course::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Serialize for Course {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Course::Degrees(d) => serializer.serialize_f64(*d),
            Course::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Course {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Degrees(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Degrees(d) => Course::from_degrees(d).map_err(D::Error::custom),
            Raw::Text(s) if s.eq_ignore_ascii_case("unknown") => Ok(Course::Unknown),
            Raw::Text(s) => Err(D::Error::custom(format!("invalid course '{}'", s))),
        }
    }
}

/// Input for [`VesselRecord::new`].
#[derive(Debug, Clone)]
pub struct NewVesselRecord {
    pub name: String,
    pub mmsi: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: f64,
    pub course: Course,
    pub vessel_type: String,
    pub captured_at: DateTime<Utc>,
}

/// One observation of the tracked vessel. Fields are private so a record
/// can only come from validated input and is never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NewVesselRecordSerde")]
pub struct VesselRecord {
    name: String,
    mmsi: u64,
    latitude: f64,
    longitude: f64,
    speed_knots: f64,
    course: Course,
    vessel_type: String,
    captured_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct NewVesselRecordSerde {
    name: String,
    mmsi: u64,
    latitude: f64,
    longitude: f64,
    speed_knots: f64,
    course: Course,
    vessel_type: String,
    captured_at: DateTime<Utc>,
}

impl TryFrom<NewVesselRecordSerde> for VesselRecord {
    type Error = RecordError;

    fn try_from(raw: NewVesselRecordSerde) -> Result<Self, Self::Error> {
        VesselRecord::new(NewVesselRecord {
            name: raw.name,
            mmsi: raw.mmsi,
            latitude: raw.latitude,
            longitude: raw.longitude,
            speed_knots: raw.speed_knots,
            course: raw.course,
            vessel_type: raw.vessel_type,
            captured_at: raw.captured_at,
        })
    }
}

impl VesselRecord {
    pub fn new(new: NewVesselRecord) -> Result<Self, RecordError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        if !new.latitude.is_finite() || !(-90.0..=90.0).contains(&new.latitude) {
            return Err(RecordError::LatitudeOutOfRange(new.latitude));
        }
        if !new.longitude.is_finite() || !(-180.0..=180.0).contains(&new.longitude) {
            return Err(RecordError::LongitudeOutOfRange(new.longitude));
        }
        if !new.speed_knots.is_finite() || new.speed_knots < 0.0 {
            return Err(RecordError::InvalidSpeed(new.speed_knots));
        }
        if let Course::Degrees(d) = new.course {
            Course::from_degrees(d)?;
        }

        Ok(Self {
            name,
            mmsi: new.mmsi,
            latitude: new.latitude,
            longitude: new.longitude,
            speed_knots: new.speed_knots,
            course: new.course,
            vessel_type: new.vessel_type.trim().to_string(),
            captured_at: new.captured_at,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mmsi(&self) -> u64 {
        self.mmsi
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn speed_knots(&self) -> f64 {
        self.speed_knots
    }

    pub fn course(&self) -> Course {
        self.course
    }

    pub fn vessel_type(&self) -> &str {
        &self.vessel_type
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.captured_at)
    }

    /// A record is stale once it is older than one update interval.
    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        self.age(now) > interval
    }
}

//! Serde adapter writing a `Duration` as whole milliseconds.
//!
//! Use with `#[serde(with = "mesh_common::utils::duration_ms")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(d)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        wait: Duration,
    }

    #[test]
    fn test_duration_is_plain_millis() {
        let json = serde_json::to_string(&Holder { wait: Duration::from_millis(1500) }).unwrap();
        assert_eq!(json, r#"{"wait":1500}"#);

        let back: Holder = serde_json::from_str(r#"{"wait":250}"#).unwrap();
        assert_eq!(back.wait, Duration::from_millis(250));
    }
}

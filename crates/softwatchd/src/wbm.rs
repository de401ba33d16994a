//! WBM monitoring payload decode.
//!
//! The monitoring endpoint serves an XML document of the form
//! `<monitor><PageZeroSample>...</PageZeroSample></monitor>`; the sample
//! carries everything the decision gates need. Numeric fields arrive as
//! strings and may hold the literal `Infinity`, which counts as 0.0.

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

/// Timestamp format shared by every WBM view.
pub const WBM_TIME_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// Beam-mode tag reported while beams are stable and collidable.
pub const STABLE_BEAMS_TAG: &str = "STABLE";

/// Inclusion flag value meaning the pixel detector is in the run.
pub const PIXEL_IN_RUN: &str = "IN";

/// Decode failures for the monitoring payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not a valid PageZero document: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("collectionTimeGMT {0:?} is not in WBM time format")]
    Timestamp(String),
}

/// One decoded PageZero monitoring snapshot.
///
/// The collection timestamp is parsed eagerly; a sample whose timestamp does
/// not parse cannot serve the freshness gate and is rejected at decode time.
/// Run number and luminosities stay raw, the parseable-data gate owns their
/// interpretation.
#[derive(Debug, Clone)]
pub struct MonitoringSnapshot {
    pub collected_at: NaiveDateTime,
    pub bmode_tag: String,
    pub io_pixel: String,
    pub run_number: String,
    pub lumi_run: String,
    pub instant_lumi: String,
}

impl MonitoringSnapshot {
    pub fn stable_beams(&self) -> bool {
        self.bmode_tag == STABLE_BEAMS_TAG
    }

    pub fn pixel_in_run(&self) -> bool {
        self.io_pixel == PIXEL_IN_RUN
    }
}

#[derive(Debug, Deserialize)]
struct Monitor {
    #[serde(rename = "PageZeroSample")]
    sample: PageZeroSample,
}

#[derive(Debug, Deserialize)]
struct PageZeroSample {
    #[serde(rename = "collectionTimeGMT")]
    collection_time_gmt: String,
    #[serde(rename = "BMODEtag")]
    bmode_tag: String,
    #[serde(rename = "IO_PIXEL")]
    io_pixel: String,
    #[serde(rename = "runNumber")]
    run_number: String,
    #[serde(rename = "lumiRun")]
    lumi_run: String,
    #[serde(rename = "instantLumi")]
    instant_lumi: String,
}

/// Decode a PageZero XML payload into a snapshot.
pub fn decode_snapshot(xml: &str) -> Result<MonitoringSnapshot, DecodeError> {
    let monitor: Monitor = quick_xml::de::from_str(xml)?;
    let sample = monitor.sample;

    let collected_at = NaiveDateTime::parse_from_str(&sample.collection_time_gmt, WBM_TIME_FORMAT)
        .map_err(|_| DecodeError::Timestamp(sample.collection_time_gmt.clone()))?;

    Ok(MonitoringSnapshot {
        collected_at,
        bmode_tag: sample.bmode_tag,
        io_pixel: sample.io_pixel,
        run_number: sample.run_number,
        lumi_run: sample.lumi_run,
        instant_lumi: sample.instant_lumi,
    })
}

/// Parse a WBM luminosity field.
///
/// The literal `Infinity` counts as 0.0; anything else must parse as a
/// finite float.
pub fn parse_lumi(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw == "Infinity" {
        return Some(0.0);
    }
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_xml(collection_time: &str) -> String {
        format!(
            "<monitor><PageZeroSample>\
             <collectionTimeGMT>{collection_time}</collectionTimeGMT>\
             <BMODEtag>STABLE</BMODEtag>\
             <IO_PIXEL>IN</IO_PIXEL>\
             <runNumber>201234</runNumber>\
             <lumiRun>123.4</lumiRun>\
             <instantLumi>5432.1</instantLumi>\
             </PageZeroSample></monitor>"
        )
    }

    #[test]
    fn test_decode_complete_sample() {
        let snapshot = decode_snapshot(&sample_xml("2022.10.14 08:15:00")).unwrap();
        assert_eq!(
            snapshot.collected_at,
            NaiveDateTime::parse_from_str("2022.10.14 08:15:00", WBM_TIME_FORMAT).unwrap()
        );
        assert!(snapshot.stable_beams());
        assert!(snapshot.pixel_in_run());
        assert_eq!(snapshot.run_number, "201234");
        assert_eq!(snapshot.lumi_run, "123.4");
        assert_eq!(snapshot.instant_lumi, "5432.1");
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let xml = "<monitor><PageZeroSample>\
                   <collectionTimeGMT>2022.10.14 08:15:00</collectionTimeGMT>\
                   <BMODEtag>STABLE</BMODEtag>\
                   </PageZeroSample></monitor>";
        assert!(matches!(decode_snapshot(xml), Err(DecodeError::Xml(_))));
    }

    #[test]
    fn test_decode_rejects_non_xml() {
        assert!(decode_snapshot("<html>Service unavailable</html>").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let result = decode_snapshot(&sample_xml("14/10/2022 08:15"));
        assert!(matches!(result, Err(DecodeError::Timestamp(_))));
    }

    #[test]
    fn test_non_stable_beam_mode() {
        let xml = sample_xml("2022.10.14 08:15:00").replace("STABLE", "SQUEEZE");
        let snapshot = decode_snapshot(&xml).unwrap();
        assert!(!snapshot.stable_beams());
    }

    #[test]
    fn test_parse_lumi_plain() {
        assert_eq!(parse_lumi("123.4"), Some(123.4));
        assert_eq!(parse_lumi(" 0 "), Some(0.0));
    }

    #[test]
    fn test_parse_lumi_infinity_is_zero() {
        assert_eq!(parse_lumi("Infinity"), Some(0.0));
    }

    #[test]
    fn test_parse_lumi_rejects_garbage() {
        assert_eq!(parse_lumi("n/a"), None);
        assert_eq!(parse_lumi(""), None);
        assert_eq!(parse_lumi("NaN"), None);
    }
}

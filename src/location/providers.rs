//! Network location provider: IP geolocation via ipapi.co.

use serde::Deserialize;
use std::time::Duration;

use super::error::LocationError;
use super::types::LocationFix;

const IP_API_URL: &str = "https://ipapi.co/json/";
const USER_AGENT: &str = "LoadLocation/0.3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

/// Ask ipapi.co where this machine is.
pub fn ip_geolocate() -> Result<LocationFix, LocationError> {
    let response = ureq::get(IP_API_URL)
        .set("User-Agent", USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .call()
        .map_err(|e| LocationError::Network(e.to_string()))?;

    let body = response
        .into_string()
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

    parse_ip_response(&body)
}

/// Turn an ipapi.co JSON body into a fix.
pub fn parse_ip_response(body: &str) -> Result<LocationFix, LocationError> {
    let r: IpApiResult =
        serde_json::from_str(body).map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

    if r.error.unwrap_or(false) {
        return Err(LocationError::InvalidResponse(
            r.reason.unwrap_or_else(|| "provider reported an error".into()),
        ));
    }

    let lat = r.latitude.ok_or_else(|| LocationError::InvalidResponse("no latitude".into()))?;
    let lon = r.longitude.ok_or_else(|| LocationError::InvalidResponse("no longitude".into()))?;
    LocationFix::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "ip": "203.0.113.7",
            "city": "Stockholm",
            "country_name": "Sweden",
            "latitude": 59.3293,
            "longitude": 18.0686,
            "timezone": "Europe/Stockholm"
        }"#;
        let fix = parse_ip_response(body).unwrap();
        assert_relative_eq!(fix.latitude(), 59.3293);
        assert_relative_eq!(fix.longitude(), 18.0686);
    }

    #[test]
    fn test_parse_missing_coordinates() {
        let err = parse_ip_response(r#"{ "city": "Nowhere" }"#).unwrap_err();
        assert!(matches!(err, LocationError::InvalidResponse(ref m) if m == "no latitude"));
    }

    #[test]
    fn test_parse_rate_limited() {
        let body = r#"{ "error": true, "reason": "RateLimited" }"#;
        let err = parse_ip_response(body).unwrap_err();
        assert!(err.to_string().contains("RateLimited"));
    }

    #[test]
    fn test_parse_out_of_range() {
        let err = parse_ip_response(r#"{ "latitude": 123.0, "longitude": 0.0 }"#).unwrap_err();
        assert!(matches!(err, LocationError::InvalidCoordinates { .. }));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_ip_response("<html>"),
            Err(LocationError::InvalidResponse(_))
        ));
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Classification of decoded barcode payloads
//!
//! Barcodes carry plain strings, but several well-known prefixes signal
//! structured content (links, WiFi credentials, contacts, ...). The launcher
//! shows the classification next to the scanned value.

use serde::Serialize;

/// Kind of content encoded in a barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Anything not recognised below
    Text,
    /// http(s) link, or a bare domain name
    Url,
    /// `WIFI:` network credentials
    Wifi,
    /// `tel:` URI
    Phone,
    /// `mailto:` URI or `MATMSG:` payload
    Email,
    /// `sms:` / `smsto:` URI
    Sms,
    /// `geo:` URI with numeric coordinates
    Geo,
    /// vCard or MECARD contact
    ContactInfo,
    /// iCalendar event
    CalendarEvent,
}

impl ValueType {
    /// Classify a raw payload
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        let upper_prefix: String = trimmed
            .chars()
            .take(16)
            .collect::<String>()
            .to_ascii_uppercase();
        let has_prefix = |prefix: &str| upper_prefix.starts_with(prefix);

        if has_prefix("WIFI:") {
            return Self::Wifi;
        }
        if has_prefix("HTTP://") || has_prefix("HTTPS://") {
            return Self::Url;
        }
        if has_prefix("TEL:") {
            return Self::Phone;
        }
        if has_prefix("MAILTO:") || has_prefix("MATMSG:") {
            return Self::Email;
        }
        if has_prefix("SMS:") || has_prefix("SMSTO:") {
            return Self::Sms;
        }
        if has_prefix("GEO:") && is_geo_uri(&trimmed[4..]) {
            return Self::Geo;
        }
        if has_prefix("BEGIN:VCARD") || has_prefix("MECARD:") {
            return Self::ContactInfo;
        }
        if has_prefix("BEGIN:VCALENDAR") || has_prefix("BEGIN:VEVENT") {
            return Self::CalendarEvent;
        }
        if looks_like_domain(trimmed) {
            return Self::Url;
        }

        Self::Text
    }

    /// Short human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Url => "Link",
            Self::Wifi => "WiFi network",
            Self::Phone => "Phone number",
            Self::Email => "Email",
            Self::Sms => "SMS",
            Self::Geo => "Location",
            Self::ContactInfo => "Contact",
            Self::CalendarEvent => "Calendar event",
        }
    }
}

/// `lat,lon[,alt][?query]` with parseable numbers
fn is_geo_uri(rest: &str) -> bool {
    let coords = rest.split_once('?').map_or(rest, |(coords, _)| coords);
    let mut parts = coords.split(',');
    let latitude = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
    let longitude = parts.next().and_then(|p| p.trim().parse::<f64>().ok());

    matches!(
        (latitude, longitude),
        (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
    )
}

/// Scheme-less links such as `www.example.org` or `example.com/path`
fn looks_like_domain(s: &str) -> bool {
    if s.len() >= 256 || s.contains(char::is_whitespace) || !s.contains('.') {
        return false;
    }
    let host = s.split('/').next().unwrap_or(s).to_ascii_lowercase();
    host.starts_with("www.")
        || [".com", ".org", ".net", ".io", ".dev", ".app"]
            .iter()
            .any(|tld| host.ends_with(tld))
}

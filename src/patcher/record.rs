use serde::Serialize;

use crate::{geolookup::models::GeoIdentity, mmdb::DataValue};

/// Localized names of a place. Only English is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Names {
    pub en: String,
}

/// Country block of a GeoIP2 record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryRecord {
    pub geoname_id: u32,
    pub iso_code: String,
    pub names: Names,
}

impl From<&GeoIdentity> for CountryRecord {
    fn from(identity: &GeoIdentity) -> Self {
        Self {
            geoname_id: identity.geoname_id,
            iso_code: identity.iso_code.clone(),
            names: Names {
                en: identity.name.clone(),
            },
        }
    }
}

impl From<CountryRecord> for DataValue {
    fn from(record: CountryRecord) -> Self {
        DataValue::from_iter([
            ("geoname_id", DataValue::Uint32(record.geoname_id)),
            ("iso_code", DataValue::from(record.iso_code)),
            (
                "names",
                DataValue::from_iter([("en", DataValue::from(record.names.en))]),
            ),
        ])
    }
}

/// The part of a database record a patch overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeRecord {
    pub country: CountryRecord,
    pub registered_country: CountryRecord,
    pub patched: bool,
}

impl AttributeRecord {
    /// Builds the record for a network from its two resolved identities.
    pub fn build(country: &GeoIdentity, registered_country: &GeoIdentity) -> Self {
        Self {
            country: country.into(),
            registered_country: registered_country.into(),
            patched: true,
        }
    }
}

impl From<AttributeRecord> for DataValue {
    fn from(record: AttributeRecord) -> Self {
        DataValue::from_iter([
            ("country", DataValue::from(record.country)),
            ("registered_country", DataValue::from(record.registered_country)),
            ("patched", DataValue::Bool(record.patched)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(value: &DataValue) -> Vec<&str> {
        match value {
            DataValue::Map(map) => map.keys().map(String::as_str).collect(),
            _ => panic!("not a map: {:?}", value),
        }
    }

    #[test]
    fn builds_both_places() {
        let rwanda = GeoIdentity::new(49518, "RW", "Rwanda");
        let uk = GeoIdentity::new(2635167, "GB", "United Kingdom");
        let value = DataValue::from(AttributeRecord::build(&rwanda, &uk));

        assert_eq!(keys(&value), ["country", "patched", "registered_country"]);
        assert_eq!(value.get("patched"), Some(&DataValue::Bool(true)));
        assert_eq!(
            value.path(&["country", "geoname_id"]),
            Some(&DataValue::Uint32(49518))
        );
        assert_eq!(
            value.path(&["country", "names", "en"]).and_then(DataValue::as_str),
            Some("Rwanda")
        );
        assert_eq!(
            value
                .path(&["registered_country", "iso_code"])
                .and_then(DataValue::as_str),
            Some("GB")
        );
    }

    #[test]
    fn places_have_exact_keys() {
        let rwanda = GeoIdentity::new(49518, "RW", "Rwanda");
        let value = DataValue::from(AttributeRecord::build(&rwanda, &rwanda));

        for place in ["country", "registered_country"] {
            let place = value.get(place).unwrap();
            assert_eq!(keys(place), ["geoname_id", "iso_code", "names"]);
            assert_eq!(keys(place.get("names").unwrap()), ["en"]);
        }
    }

    #[test]
    fn serializes_like_the_database_record() {
        let rwanda = GeoIdentity::new(49518, "RW", "Rwanda");
        let record = AttributeRecord::build(&rwanda, &rwanda);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["country"]["iso_code"], "RW");
        assert_eq!(json["country"]["geoname_id"], 49518);
        assert_eq!(json["country"]["names"]["en"], "Rwanda");
        assert_eq!(json["registered_country"]["names"]["en"], "Rwanda");
        assert_eq!(json["patched"], true);

        let country = json["country"].as_object().unwrap();
        let mut keys: Vec<&str> = country.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["geoname_id", "iso_code", "names"]);
    }
}

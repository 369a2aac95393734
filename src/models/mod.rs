use crate::numbers::{parse_amount, parse_floor, FloorInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a listing type is priced as a sale or a rental
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Sale,
    Rent,
}

/// Lightweight pointer to a listing card found on an index page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListingReference {
    pub title: String,
    pub price_text: String,
    pub url: String,
}

/// Which strategy produced the pricing fields of a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PriceSource {
    ConversionTable,
    LabeledRows,
    TextPattern,
    None,
}

/// Type-specific pricing, flattened into the record with a `kind` tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Pricing {
    #[serde(rename_all = "camelCase")]
    Sale {
        total_price: Option<String>,
        price_per_unit: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Rent {
        deposit: Option<String>,
        monthly_rent: Option<String>,
        convertible: bool,
    },
}

impl Pricing {
    pub fn kind(&self) -> ListingKind {
        match self {
            Pricing::Sale { .. } => ListingKind::Sale,
            Pricing::Rent { .. } => ListingKind::Rent,
        }
    }
}

/// Integer values parsed from the display text of a record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NumericFields {
    pub area: Option<i64>,
    pub build_year: Option<i64>,
    pub rooms: Option<i64>,
    pub floor: FloorInfo,
    pub total_price: Option<i64>,
    pub price_per_unit: Option<i64>,
    pub deposit: Option<i64>,
    pub monthly_rent: Option<i64>,
}

/// Listing extracted from a detail page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub city: String,
    pub listing_type: String,
    pub title: String,
    pub area: Option<String>,
    pub build_year: Option<String>,
    pub rooms: Option<String>,
    pub floor: Option<String>,
    pub elevator: Option<String>,
    pub parking: Option<String>,
    pub storage: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub map_location: Option<String>,
    pub image_confirmation: Option<String>,
    pub image_links: Vec<String>,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub price_source: PriceSource,
    #[serde(default)]
    pub low_confidence: Vec<String>,
    #[serde(default)]
    pub numeric: NumericFields,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Names of optional fields the page did not provide
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let common = [
            ("area", &self.area),
            ("buildYear", &self.build_year),
            ("rooms", &self.rooms),
            ("floor", &self.floor),
            ("elevator", &self.elevator),
            ("parking", &self.parking),
            ("storage", &self.storage),
            ("description", &self.description),
            ("location", &self.location),
        ];
        for (name, value) in common {
            if value.is_none() {
                missing.push(name);
            }
        }

        match &self.pricing {
            Pricing::Sale {
                total_price,
                price_per_unit,
            } => {
                if total_price.is_none() {
                    missing.push("totalPrice");
                }
                if price_per_unit.is_none() {
                    missing.push("pricePerUnit");
                }
            }
            Pricing::Rent {
                deposit,
                monthly_rent,
                ..
            } => {
                if deposit.is_none() {
                    missing.push("deposit");
                }
                if monthly_rent.is_none() {
                    missing.push("monthlyRent");
                }
            }
        }

        missing
    }

    /// Recompute the integer view of the display fields
    pub fn with_numeric_fields(mut self) -> Self {
        let amount = |value: &Option<String>| value.as_deref().and_then(parse_amount);

        let mut numeric = NumericFields {
            area: amount(&self.area),
            build_year: amount(&self.build_year),
            rooms: amount(&self.rooms),
            floor: self.floor.as_deref().map(parse_floor).unwrap_or_default(),
            ..NumericFields::default()
        };

        match &self.pricing {
            Pricing::Sale {
                total_price,
                price_per_unit,
            } => {
                numeric.total_price = amount(total_price);
                numeric.price_per_unit = amount(price_per_unit);
            }
            Pricing::Rent {
                deposit,
                monthly_rent,
                ..
            } => {
                numeric.deposit = amount(deposit);
                numeric.monthly_rent = amount(monthly_rent);
            }
        }

        self.numeric = numeric;
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_is_flattened_with_kind_tag() {
        let record = fixtures::rent_record("karaj", "https://divar.ir/v/a/1");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["kind"], "rent");
        assert_eq!(json["deposit"], "۱۰۰،۰۰۰،۰۰۰ تومان");
        assert_eq!(json["convertible"], false);
        assert_eq!(json["sourceUrl"], "https://divar.ir/v/a/1");
        assert_eq!(json["priceSource"], "labeledRows");

        let back: ListingRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.pricing.kind(), ListingKind::Rent);
    }

    #[test]
    fn numeric_fields_follow_display_text() {
        let record = fixtures::rent_record("karaj", "u").with_numeric_fields();

        assert_eq!(record.numeric.area, Some(80));
        assert_eq!(record.numeric.build_year, Some(1395));
        assert_eq!(record.numeric.floor.current, Some(3));
        assert_eq!(record.numeric.floor.total, Some(4));
        assert_eq!(record.numeric.deposit, Some(100_000_000));
        assert_eq!(record.numeric.monthly_rent, Some(8_000_000));
        assert_eq!(record.numeric.total_price, None);
    }

    #[test]
    fn missing_fields_lists_absent_values() {
        let record = fixtures::rent_record("karaj", "u");
        assert_eq!(record.missing_fields(), vec!["parking", "storage"]);
    }
}

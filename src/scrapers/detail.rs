use crate::config::{ListingTypeConfig, Timing};
use crate::error::ExtractionError;
use crate::models::{ListingKind, ListingRecord, ListingReference, NumericFields, PriceSource, Pricing};
use crate::scrapers::inner_text;
use crate::scrapers::traits::BrowserPage;
use crate::scrapers::types::{
    labels, selectors, DETAIL_SCROLL_MAX_STEPS, DETAIL_SCROLL_PAUSE_MS, DETAIL_SCROLL_STEP,
};
use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector(selectors::TITLE));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(selectors::DESCRIPTION));
static LOCATION: LazyLock<Selector> = LazyLock::new(|| selector(selectors::LOCATION));
static MAP_LINK: LazyLock<Selector> = LazyLock::new(|| selector(selectors::MAP_LINK));
static IMAGE: LazyLock<Selector> = LazyLock::new(|| selector(selectors::IMAGE));
static BASE_ROW: LazyLock<Selector> = LazyLock::new(|| selector(selectors::BASE_ROW));
static BASE_ROW_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(selectors::BASE_ROW_TITLE));
static BASE_ROW_VALUE: LazyLock<Selector> = LazyLock::new(|| selector(selectors::BASE_ROW_VALUE));
static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static GROUP_ROW_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(selectors::GROUP_ROW_TITLE));
static INFO_CELL: LazyLock<Selector> = LazyLock::new(|| selector(selectors::INFO_CELL));
static FEATURE_CELL: LazyLock<Selector> = LazyLock::new(|| selector(selectors::FEATURE_CELL));
static CONVERSION_TABLE: LazyLock<Selector> =
    LazyLock::new(|| selector(selectors::CONVERSION_TABLE));
static CONVERSION_CELL: LazyLock<Selector> = LazyLock::new(|| selector(selectors::CONVERSION_CELL));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));

static DEPOSIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| amount_pattern(labels::DEPOSIT_KEYWORDS));
static RENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| amount_pattern(labels::RENT_KEYWORDS));

/// `<keyword> ... <amount> تومان`, with at most 40 non-digit characters in between
fn amount_pattern(keywords: &[&str]) -> Regex {
    let keywords = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?:{keywords})[^\d۰-۹]{{0,40}}?([\d۰-۹][\d۰-۹,،٬]*)\s*{}",
        labels::CURRENCY
    ))
    .unwrap()
}

/// A `.kt-base-row` label and its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRow {
    pub label: String,
    pub value: Option<String>,
}

/// What the extractor reads from a rendered detail page
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub map_link: Option<String>,
    pub rows: Vec<LabeledRow>,
    /// Column titles of the area / build year / rooms table
    pub info_titles: Vec<String>,
    pub info_cells: Vec<String>,
    pub feature_cells: Vec<String>,
    /// Cells of the deposit/rent conversion table, when the listing has one
    pub conversion_cells: Option<Vec<String>>,
    pub images: Vec<String>,
    /// Visible body text, one text node per line
    pub text: String,
}

impl DetailPage {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let first_text = |sel: &Selector| document.select(sel).next().and_then(inner_text);
        let texts = |root: ElementRef<'_>, sel: &Selector| -> Vec<String> {
            root.select(sel)
                .map(|el| inner_text(el).unwrap_or_default())
                .collect()
        };

        let rows = document
            .select(&BASE_ROW)
            .filter_map(|row| {
                let label = row.select(&BASE_ROW_TITLE).next().and_then(inner_text)?;
                let value = row.select(&BASE_ROW_VALUE).next().and_then(inner_text);
                Some(LabeledRow { label, value })
            })
            .collect();

        // The info table is the first table holding info-row cells
        let info_table = document
            .select(&TABLE)
            .find(|table| table.select(&INFO_CELL).next().is_some());
        let (info_titles, info_cells) = match info_table {
            Some(table) => (texts(table, &GROUP_ROW_TITLE), texts(table, &INFO_CELL)),
            None => (Vec::new(), texts(document.root_element(), &INFO_CELL)),
        };

        let conversion_cells = document
            .select(&CONVERSION_TABLE)
            .next()
            .map(|table| texts(table, &CONVERSION_CELL));

        let images = document
            .select(&IMAGE)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .collect();

        let text = document
            .select(&BODY)
            .next()
            .map(|body| {
                body.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        Self {
            title: first_text(&TITLE),
            description: first_text(&DESCRIPTION),
            location: first_text(&LOCATION),
            map_link: document
                .select(&MAP_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            rows,
            info_titles,
            info_cells,
            feature_cells: texts(document.root_element(), &FEATURE_CELL),
            conversion_cells,
            images,
            text,
        }
    }

    /// Label lookup: value of the first row whose label equals `label`
    pub fn row_value(&self, label: &str) -> Option<&str> {
        for row in &self.rows {
            if row.label == label {
                return row.value.as_deref();
            }
        }
        None
    }

    /// Info table cell under the column titled `label`, else the cell at `position`
    fn info_value(&self, label: &str, position: usize) -> Option<String> {
        self.info_titles
            .iter()
            .position(|title| title.contains(label))
            .and_then(|i| self.info_cells.get(i))
            .or_else(|| self.info_cells.get(position))
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn feature(&self, position: usize) -> Option<String> {
        self.feature_cells
            .get(position)
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// Deposit / rent pair and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentQuote {
    pub deposit: Option<String>,
    pub monthly_rent: Option<String>,
    pub convertible: bool,
    pub source: PriceSource,
}

type RentStrategy = fn(&DetailPage) -> Option<RentQuote>;

/// Tried in order; the first strategy that yields a quote wins
const RENT_STRATEGIES: &[RentStrategy] = &[from_conversion_table, from_labeled_rows, from_page_text];

/// The conversion table only exists on convertible listings; its first two
/// cells are deposit and rent
fn from_conversion_table(page: &DetailPage) -> Option<RentQuote> {
    let cells = page.conversion_cells.as_ref()?;
    let cell = |i: usize| cells.get(i).filter(|v| !v.is_empty()).cloned();
    Some(RentQuote {
        deposit: cell(0),
        monthly_rent: cell(1),
        convertible: true,
        source: PriceSource::ConversionTable,
    })
}

fn from_labeled_rows(page: &DetailPage) -> Option<RentQuote> {
    let deposit = page.row_value(labels::DEPOSIT).map(str::to_string);
    let monthly_rent = page.row_value(labels::MONTHLY_RENT).map(str::to_string);
    if deposit.is_none() && monthly_rent.is_none() {
        return None;
    }
    Some(RentQuote {
        deposit,
        monthly_rent,
        convertible: false,
        source: PriceSource::LabeledRows,
    })
}

/// Last resort: currency amounts near deposit/rent keywords anywhere in the
/// page text. May pick up the wrong number.
fn from_page_text(page: &DetailPage) -> Option<RentQuote> {
    let find = |pattern: &Regex| {
        pattern
            .captures(&page.text)
            .map(|caps| format!("{} {}", &caps[1], labels::CURRENCY))
    };
    let deposit = find(&DEPOSIT_PATTERN);
    let monthly_rent = find(&RENT_PATTERN);
    if deposit.is_none() && monthly_rent.is_none() {
        return None;
    }
    Some(RentQuote {
        deposit,
        monthly_rent,
        convertible: false,
        source: PriceSource::TextPattern,
    })
}

pub fn rent_quote(page: &DetailPage) -> RentQuote {
    RENT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(page))
        .unwrap_or(RentQuote {
            deposit: None,
            monthly_rent: None,
            convertible: false,
            source: PriceSource::None,
        })
}

fn pricing(page: &DetailPage, kind: ListingKind) -> (Pricing, PriceSource, Vec<String>) {
    match kind {
        ListingKind::Sale => {
            let total_price = page.row_value(labels::TOTAL_PRICE).map(str::to_string);
            let price_per_unit = page.row_value(labels::PRICE_PER_METER).map(str::to_string);
            let source = if total_price.is_some() || price_per_unit.is_some() {
                PriceSource::LabeledRows
            } else {
                PriceSource::None
            };
            (
                Pricing::Sale {
                    total_price,
                    price_per_unit,
                },
                source,
                Vec::new(),
            )
        }
        ListingKind::Rent => {
            let quote = rent_quote(page);
            let mut low_confidence = Vec::new();
            if quote.source == PriceSource::TextPattern {
                if quote.deposit.is_some() {
                    low_confidence.push("deposit".to_string());
                }
                if quote.monthly_rent.is_some() {
                    low_confidence.push("monthlyRent".to_string());
                }
            }
            (
                Pricing::Rent {
                    deposit: quote.deposit,
                    monthly_rent: quote.monthly_rent,
                    convertible: quote.convertible,
                },
                quote.source,
                low_confidence,
            )
        }
    }
}

/// Assemble a record from a parsed detail page
pub fn build_record(
    page: &DetailPage,
    reference: &ListingReference,
    city: &str,
    listing_type: &ListingTypeConfig,
) -> ListingRecord {
    let image_confirmation = page.row_value(labels::IMAGE_CONFIRMATION).map(str::to_string);
    let image_links = if image_confirmation.as_deref() == Some(labels::AFFIRMATIVE) {
        page.images.clone()
    } else {
        Vec::new()
    };

    let (pricing, price_source, low_confidence) = pricing(page, listing_type.kind);

    ListingRecord {
        city: city.to_string(),
        listing_type: listing_type.name.clone(),
        title: page.title.clone().unwrap_or_else(|| reference.title.clone()),
        area: page.info_value(labels::AREA, 0),
        build_year: page.info_value(labels::BUILD_YEAR, 1),
        rooms: page.info_value(labels::ROOMS, 2),
        floor: page.row_value(labels::FLOOR).map(str::to_string),
        parking: page.feature(0),
        elevator: page.feature(1),
        storage: page.feature(2),
        description: page.description.clone(),
        location: page.location.clone(),
        map_location: page.map_link.clone(),
        image_confirmation,
        image_links,
        pricing,
        price_source,
        low_confidence,
        numeric: NumericFields::default(),
        source_url: reference.url.clone(),
        scraped_at: Utc::now(),
    }
    .with_numeric_fields()
}

fn check_budget(started: Instant, budget: Duration) -> Result<(), ExtractionError> {
    if started.elapsed() > budget {
        return Err(ExtractionError::Timeout {
            budget_ms: budget.as_millis() as u64,
        });
    }
    Ok(())
}

/// Open one listing's detail page and extract its record.
///
/// Navigation and the title wait are bounded by their own timeouts; the
/// whole procedure is additionally bounded by the per-listing budget,
/// checked between steps.
pub fn extract_listing<P: BrowserPage>(
    page: &P,
    reference: &ListingReference,
    city: &str,
    listing_type: &ListingTypeConfig,
    timing: &Timing,
) -> Result<ListingRecord, ExtractionError> {
    let started = Instant::now();
    let budget = timing.ad_process_timeout();

    page.navigate(&reference.url, timing.page_load_timeout())
        .map_err(ExtractionError::PageUnavailable)?;
    page.wait_for(selectors::TITLE_ANCHOR, timing.element_wait_timeout())
        .map_err(ExtractionError::PageUnavailable)?;
    check_budget(started, budget)?;

    if let Err(e) = page.scroll_to_bottom(
        DETAIL_SCROLL_STEP,
        Duration::from_millis(DETAIL_SCROLL_PAUSE_MS),
        DETAIL_SCROLL_MAX_STEPS,
    ) {
        debug!(url = %reference.url, error = %e, "Scroll-to-bottom failed, reading page as is");
    }
    check_budget(started, budget)?;

    let html = page.content().map_err(ExtractionError::PageUnavailable)?;
    let record = build_record(&DetailPage::parse(&html), reference, city, listing_type);

    let missing = record.missing_fields();
    if !missing.is_empty() {
        debug!(url = %reference.url, ?missing, "Listing extracted with missing fields");
    }
    if !record.low_confidence.is_empty() {
        debug!(url = %reference.url, fields = ?record.low_confidence, "Price read from page text");
    }

    Ok(record)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::scrapers::types::labels;

    #[derive(Default)]
    pub struct DetailFixture<'a> {
        pub title: &'a str,
        pub rows: Vec<(&'a str, &'a str)>,
        pub conversion: Option<(&'a str, &'a str)>,
        pub images: Vec<&'a str>,
        pub extra_text: &'a str,
    }

    impl DetailFixture<'_> {
        pub fn html(&self) -> String {
            let rows: String = self
                .rows
                .iter()
                .map(|(label, value)| {
                    format!(
                        r#"<div class="kt-base-row kt-unexpandable-row"><div class="kt-base-row__start"><p class="kt-base-row__title">{label}</p></div><div class="kt-base-row__end"><p class="kt-unexpandable-row__value">{value}</p></div></div>"#
                    )
                })
                .collect();
            let conversion = self
                .conversion
                .map(|(deposit, rent)| {
                    format!(
                        r#"<div class="convert-slider"><table class="kt-group-row"><thead><tr><th class="kt-group-row-item__title">{}</th><th class="kt-group-row-item__title">{}</th></tr></thead><tbody><tr><td>{deposit}</td><td>{rent}</td></tr></tbody></table></div>"#,
                        labels::DEPOSIT,
                        labels::MONTHLY_RENT
                    )
                })
                .unwrap_or_default();
            let images: String = self
                .images
                .iter()
                .map(|src| format!(r#"<img class="kt-image-block__image kt-image-block__image--fading" src="{src}">"#))
                .collect();

            format!(
                r#"<html><body>
                <h1 class="kt-page-title__title">{title}</h1>
                <div class="kt-page-title__subtitle kt-page-title__subtitle--responsive-sized">لحظاتی پیش در کرج، گوهردشت</div>
                <div class="kt-base-carousel">{images}</div>
                <table class="kt-group-row"><thead><tr>
                  <th class="kt-group-row-item kt-group-row-item__title">متراژ</th>
                  <th class="kt-group-row-item kt-group-row-item__title">ساخت</th>
                  <th class="kt-group-row-item kt-group-row-item__title">اتاق</th>
                </tr></thead><tbody><tr>
                  <td class="kt-group-row-item kt-group-row-item__value kt-group-row-item--info-row">۸۵</td>
                  <td class="kt-group-row-item kt-group-row-item__value kt-group-row-item--info-row">۱۳۹۸</td>
                  <td class="kt-group-row-item kt-group-row-item__value kt-group-row-item--info-row">۲</td>
                </tr></tbody></table>
                <table class="kt-group-row"><tbody><tr>
                  <td class="kt-group-row-item kt-group-row-item__value kt-body kt-body--stable">پارکینگ</td>
                  <td class="kt-group-row-item kt-group-row-item__value kt-body kt-body--stable">آسانسور</td>
                  <td class="kt-group-row-item kt-group-row-item__value kt-body kt-body--stable">انباری ندارد</td>
                </tr></tbody></table>
                {conversion}
                {rows}
                <p>{extra}</p>
                <div class="kt-description-row__text kt-description-row__text--primary">واحد نوساز و نورگیر</div>
                <a class="kt-show-map__link" href="https://maps.example/?q=35.8,50.9">map</a>
                </body></html>"#,
                title = self.title,
                extra = self.extra_text,
            )
        }
    }
}

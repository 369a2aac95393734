//! Selectors and row labels of the divar.ir page layout.

/// CSS selectors for index and detail pages
pub mod selectors {
    /// Floating "close map" button shown over the index page
    pub const MAP_OVERLAY_CLOSE: &str =
        ".kt-fab-button.kt-fab-button--medium.kt-fab-button--extended.kt-fab-button--raised";
    pub const POST_CARD: &str = "div.kt-post-card__body";
    pub const POST_CARD_TITLE: &str = "h2";
    pub const POST_CARD_DESCRIPTION: &str = "div.kt-post-card__description";
    /// Appears once infinite scroll gives way to manual pagination
    pub const LOAD_MORE: &str = "button.kt-button.kt-button--primary.kt-button--outlined.post-list__load-more-btn-be092";

    pub const TITLE_ANCHOR: &str = ".kt-page-title__title";
    pub const TITLE: &str = "h1";
    pub const DESCRIPTION: &str = ".kt-description-row__text.kt-description-row__text--primary";
    pub const LOCATION: &str = ".kt-page-title__subtitle";
    pub const MAP_LINK: &str = ".kt-show-map__link";
    pub const IMAGE: &str = ".kt-image-block__image";

    pub const BASE_ROW: &str = ".kt-base-row";
    pub const BASE_ROW_TITLE: &str = ".kt-base-row__title";
    pub const BASE_ROW_VALUE: &str = ".kt-unexpandable-row__value";

    /// Area / build year / rooms table
    pub const GROUP_ROW_TITLE: &str = ".kt-group-row-item__title";
    pub const INFO_CELL: &str = "td.kt-group-row-item--info-row";
    /// Parking / elevator / storage cells
    pub const FEATURE_CELL: &str = ".kt-group-row-item.kt-group-row-item__value.kt-body.kt-body--stable";

    pub const CONVERSION_TABLE: &str = ".convert-slider table.kt-group-row";
    pub const CONVERSION_CELL: &str = "tbody tr td";
}

/// Row labels matched by label lookup
pub mod labels {
    pub const AREA: &str = "متراژ";
    pub const BUILD_YEAR: &str = "ساخت";
    pub const ROOMS: &str = "اتاق";
    pub const FLOOR: &str = "طبقه";
    pub const DEPOSIT: &str = "ودیعه";
    pub const MONTHLY_RENT: &str = "اجاره\u{654} ماهانه";
    pub const TOTAL_PRICE: &str = "قیمت کل";
    pub const PRICE_PER_METER: &str = "قیمت هر متر";
    pub const IMAGE_CONFIRMATION: &str = "تصویر\u{200c}ها برای همین ملک است؟";
    pub const AFFIRMATIVE: &str = "بله";

    /// Keywords the loose text fallback looks for before an amount
    pub const DEPOSIT_KEYWORDS: &[&str] = &["ودیعه", "رهن"];
    pub const RENT_KEYWORDS: &[&str] = &["اجاره", "ماهانه"];
    pub const CURRENCY: &str = "تومان";
}

/// Pixels per step when forcing lazy content to render on a detail page
pub const DETAIL_SCROLL_STEP: u32 = 300;
/// Upper bound on detail-page scroll steps
pub const DETAIL_SCROLL_MAX_STEPS: usize = 60;
/// Pause between detail-page scroll steps
pub const DETAIL_SCROLL_PAUSE_MS: u64 = 200;

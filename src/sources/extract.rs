use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::models::SearchCriteria;
use crate::sources::traits::Extractor;

/// One candidate listing pulled out of a search page, before it is stamped
/// with a source id and retrieval timestamp
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub property_name: String,
    pub price: f64,
    pub currency: String,
    pub available: bool,
    pub url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub amenities: Option<Vec<String>>,
    pub image_url: Option<String>,
}

/// CSS selectors describing where listing fields live on a platform's
/// search page
#[derive(Debug, Clone)]
pub struct SelectorSet {
    pub listing: String,
    pub name: String,
    pub price: String,
    pub rating: Option<String>,
    pub reviews: Option<String>,
}

/// Selector-driven extractor. A listing without a parseable name and price
/// is skipped rather than raised.
pub struct SelectorExtractor {
    selectors: SelectorSet,
    currency: String,
    base_url: String,
}

impl SelectorExtractor {
    pub fn new(selectors: SelectorSet, currency: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            selectors,
            currency: currency.into(),
            base_url: base_url.into(),
        }
    }

    fn parse_selector(&self, css: &str) -> Option<Selector> {
        match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Invalid selector {:?}: {:?}", css, e);
                None
            }
        }
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, html: &str, _criteria: &SearchCriteria) -> Vec<Listing> {
        let mut listings = Vec::new();

        let listing_sel = match self.parse_selector(&self.selectors.listing) {
            Some(s) => s,
            None => return listings,
        };
        let name_sel = match self.parse_selector(&self.selectors.name) {
            Some(s) => s,
            None => return listings,
        };
        let price_sel = match self.parse_selector(&self.selectors.price) {
            Some(s) => s,
            None => return listings,
        };
        let rating_sel = self
            .selectors
            .rating
            .as_deref()
            .and_then(|css| self.parse_selector(css));
        let reviews_sel = self
            .selectors
            .reviews
            .as_deref()
            .and_then(|css| self.parse_selector(css));
        let link_sel = self.parse_selector("a[href]");
        let image_sel = self.parse_selector("img[src]");

        let document = Html::parse_document(html);

        for element in document.select(&listing_sel) {
            let name = element
                .select(&name_sel)
                .next()
                .map(|n| clean_text(&n.text().collect::<String>()))
                .filter(|n| !n.is_empty());

            let price = element
                .select(&price_sel)
                .next()
                .and_then(|p| parse_price(&p.text().collect::<String>()));

            // Minimum usable data: a name and a price
            let (name, price) = match (name, price) {
                (Some(name), Some(price)) => (name, price),
                _ => {
                    debug!("Skipping listing without name or price");
                    continue;
                }
            };

            let rating = rating_sel.as_ref().and_then(|sel| {
                element
                    .select(sel)
                    .next()
                    .and_then(|r| parse_rating(&r.text().collect::<String>()))
            });

            let review_count = reviews_sel.as_ref().and_then(|sel| {
                element
                    .select(sel)
                    .next()
                    .and_then(|r| parse_review_count(&r.text().collect::<String>()))
            });

            let url = link_sel.as_ref().and_then(|sel| {
                element
                    .select(sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| {
                        if href.starts_with("http") {
                            href.to_string()
                        } else {
                            format!("{}{}", self.base_url, href)
                        }
                    })
            });

            let image_url = image_sel.as_ref().and_then(|sel| {
                element
                    .select(sel)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(str::to_string)
            });

            listings.push(Listing {
                property_name: name,
                price,
                currency: self.currency.clone(),
                available: true,
                url,
                rating,
                review_count,
                amenities: None,
                image_url,
            });
        }

        listings
    }
}

/// Collapse whitespace and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull a numeric price out of text like "$1,234.56 per night"
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|p| *p > 0.0)
}

/// Extract a rating and clamp it to the 0-10 scale
pub fn parse_rating(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let run: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    run.parse::<f64>().ok().map(|r| r.clamp(0.0, 10.0))
}

/// Extract a review count from text like "(1,234 reviews)"
pub fn parse_review_count(text: &str) -> Option<u32> {
    let cleaned = text.replace(',', "");
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let run: String = cleaned[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    run.parse::<u32>().ok()
}

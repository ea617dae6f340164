use crate::models::{PageResult, RawListingRecord};
use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

// ── Page layout ───────────────────────────────────────────────────────────────

const LISTING_TITLE: &str = "a > h4";
const PROPERTY_TYPE_BADGE: &str = "span.badge";
const DETAIL_LIST: &str = "ul.list-unstyled";
const RESULTS_BANNER: &str = "h2";
const BANNER_MARKER: &str = "Displaying";

const SOLD_MARKER: &str = "Sold";
const CURRENCY_SIGN: char = '$';

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("selector {:?}: {:?}", s, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Listing fragment ──────────────────────────────────────────────────────────

/// Pulls the per-listing fields out of one detail list.
///
/// Each field is looked up on its own: a missing or odd-shaped element
/// only blanks that field.
pub struct FieldExtractor {
    list_item: Selector,
    code: Selector,
    bed_icon: Selector,
    bath_icon: Selector,
    car_icon: Selector,
}

impl FieldExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            list_item: selector("li")?,
            code: selector("code")?,
            bed_icon: selector("i.i-bed")?,
            bath_icon: selector("i.i-bath")?,
            car_icon: selector("i.i-car")?,
        })
    }

    /// Address and property type are found at page level and passed in as-is.
    pub fn extract(
        &self,
        fragment: ElementRef<'_>,
        address: Option<String>,
        property_type: Option<String>,
    ) -> RawListingRecord {
        RawListingRecord {
            address,
            sold_date_text: self.sold_date(fragment),
            price_text: self.price(fragment),
            beds: self.beds(fragment),
            baths: self.text_after_marker(fragment, &self.bath_icon),
            garages: self.text_after_marker(fragment, &self.car_icon),
            property_type,
        }
    }

    /// First text node mentioning "Sold" inside any list item.
    fn sold_date(&self, fragment: ElementRef<'_>) -> Option<String> {
        fragment.select(&self.list_item).find_map(|li| {
            li.text()
                .find(|t| t.contains(SOLD_MARKER))
                .map(|t| t.trim().to_string())
        })
    }

    fn price(&self, fragment: ElementRef<'_>) -> Option<String> {
        fragment.select(&self.code).find_map(|code| {
            let text = element_text(code);
            text.contains(CURRENCY_SIGN).then_some(text)
        })
    }

    /// The first `<big>` after the bed icon, in document order, before the
    /// next icon starts another field.
    fn beds(&self, fragment: ElementRef<'_>) -> Option<String> {
        let marker = fragment.select(&self.bed_icon).next()?;
        fragment
            .descendants()
            .skip_while(|node| node.id() != marker.id())
            .skip(1)
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "i")
            .find(|el| el.value().name() == "big")
            .map(element_text)
    }

    /// The text node directly after the marker. An element sibling does not count.
    fn text_after_marker(&self, fragment: ElementRef<'_>, marker: &Selector) -> Option<String> {
        let marker = fragment.select(marker).next()?;
        let sibling = marker.next_sibling()?;
        sibling.value().as_text().map(|t| t.trim().to_string())
    }
}

// ── Results page ──────────────────────────────────────────────────────────────

/// Locates listings on a results page and reads the "Displaying A-B of N" banner.
pub struct PageExtractor {
    title: Selector,
    badge: Selector,
    detail_list: Selector,
    banner: Selector,
    fields: FieldExtractor,
}

impl PageExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: selector(LISTING_TITLE)?,
            badge: selector(PROPERTY_TYPE_BADGE)?,
            detail_list: selector(DETAIL_LIST)?,
            banner: selector(RESULTS_BANNER)?,
            fields: FieldExtractor::new()?,
        })
    }

    /// Titles, badges and detail lists are paired by position on the page.
    /// Pairing stops at the shortest of the three sequences.
    pub fn extract(&self, html: &str) -> PageResult {
        let doc = Html::parse_document(html);

        let addresses: Vec<String> = doc.select(&self.title).map(element_text).collect();
        let types: Vec<String> = doc.select(&self.badge).map(element_text).collect();
        let fragments: Vec<ElementRef<'_>> = doc.select(&self.detail_list).collect();

        if addresses.len() != types.len() || addresses.len() != fragments.len() {
            warn!(
                titles = addresses.len(),
                badges = types.len(),
                lists = fragments.len(),
                "Listing sequences differ in length; pairing up to the shortest"
            );
        }

        let records: Vec<RawListingRecord> = addresses
            .into_iter()
            .zip(types)
            .zip(fragments)
            .map(|((address, property_type), fragment)| {
                self.fields.extract(fragment, Some(address), Some(property_type))
            })
            .collect();

        let listing_count = self.listing_count(&doc);
        debug!("Page: {} listings, banner count {:?}", records.len(), listing_count);

        PageResult { listing_count, records }
    }

    fn listing_count(&self, doc: &Html) -> Option<u32> {
        let banner = doc
            .select(&self.banner)
            .map(|h2| h2.text().collect::<String>())
            .find(|text| text.contains(BANNER_MARKER))?;
        last_integer(&banner)
    }
}

/// Last run of digits in `s`, ignoring thousands separators.
/// "Displaying 1-12 of 1,234" → 1234
pub fn last_integer(s: &str) -> Option<u32> {
    s.replace(',', "")
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .last()?
        .parse()
        .ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{FloorPlanRecord, PropertyRecord};

/// Unit cards iterated per listing are capped to bound per-page work on
/// pathological pages.
pub const MAX_FLOOR_PLANS: usize = 20;

/// Extract one listing from a detail-page snapshot. Every field read is
/// defensive: an absent element or attribute leaves the field missing and
/// the extraction moves on.
pub fn extract_property(html: &str, url: &str) -> PropertyRecord {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let mut record = PropertyRecord::new(url);
    record.title = element_text(root, "h1.propertyName");
    record.street = element_text(root, ".delivery-address span");
    record.city = element_text(root, ".propertyAddressContainer h2 span.address-city");
    record.state = nth_text(root, ".stateZipContainer span", 0);
    record.zip_code = nth_text(root, ".stateZipContainer span", 1);
    record.address = join_address(&[
        &record.street,
        &record.city,
        &record.state,
        &record.zip_code,
    ]);

    record.property_reviews = element_text(root, ".reviewRating")
        .as_deref()
        .and_then(parse_numeric);
    record.listing_verification = element_text(root, "span.verifedText");
    record.lease_options = extract_lease_options(root);
    record.year_built = extract_year_built(root);

    let unit_sel = Selector::parse("li.unitContainer").unwrap();
    let cards: Vec<ElementRef> = root.select(&unit_sel).collect();
    if cards.len() > MAX_FLOOR_PLANS {
        debug!(url, total = cards.len(), kept = MAX_FLOOR_PLANS, "capping unit cards");
    }
    for card in cards.into_iter().take(MAX_FLOOR_PLANS) {
        record.pricing_and_floor_plans.push(extract_floor_plan(card));
    }

    record
}

/// Each card is extracted independently; a card missing half its markup
/// still yields a partially-filled record without disturbing its siblings.
fn extract_floor_plan(card: ElementRef) -> FloorPlanRecord {
    FloorPlanRecord {
        apartment_name: element_text(card, ".modelName"),
        rent_price_range: element_text(card, ".rentLabel"),
        bedrooms: own_attr(card, "data-beds")
            .as_deref()
            .and_then(parse_numeric)
            .map(|v| v as i64),
        bathrooms: own_attr(card, "data-baths").as_deref().and_then(parse_numeric),
        sqft: extract_sqft(card),
        unit: element_text(card, ".unitColumn span[title]"),
        base_rent: element_text(card, ".pricingColumn > span:not(.screenReaderOnly)")
            .as_deref()
            .and_then(parse_numeric),
        availability: element_text(card, ".availableColumn .dateAvailable:not(.screenReaderOnly)"),
        details_link: own_attr(card, "data-unitkey"),
    }
}

/// Dedicated sqft column first; otherwise scan the details block for any
/// span mentioning "Sq Ft".
fn extract_sqft(card: ElementRef) -> Option<f64> {
    if let Some(direct) = element_text(card, ".sqftColumn span:not(.screenReaderOnly)") {
        return parse_numeric(&direct);
    }
    let span_sel = Selector::parse(".detailsTextWrapper span").unwrap();
    card.select(&span_sel)
        .map(full_text)
        .find(|text| text.contains("Sq Ft"))
        .and_then(|text| parse_numeric(&text))
}

/// `None` only when no lease-options card exists at all; a present card
/// with zero columns is an empty list.
fn extract_lease_options(root: ElementRef) -> Option<Vec<String>> {
    let card_sel = Selector::parse(".feesPoliciesCard").unwrap();
    let container = root
        .select(&card_sel)
        .find(|card| full_text(*card).contains("Lease Options"))?;
    let option_sel = Selector::parse(".component-list .column").unwrap();
    Some(container.select(&option_sel).filter_map(text_of).collect())
}

fn extract_year_built(root: ElementRef) -> Option<i64> {
    let card_sel = Selector::parse(".feesPoliciesCard").unwrap();
    let info_card = root
        .select(&card_sel)
        .find(|card| full_text(*card).contains("Property Information"))?;
    let column_sel = Selector::parse(".component-list .column").unwrap();
    let built = info_card
        .select(&column_sel)
        .map(full_text)
        .find(|text| text.contains("Built in "))?;
    parse_year_built(&built)
}

/// Parse the token following "Built in ". Any failure leaves the year
/// missing rather than failing the page.
pub fn parse_year_built(text: &str) -> Option<i64> {
    let rest = text.split("Built in ").nth(1)?;
    rest.split_whitespace().next()?.parse().ok()
}

/// Free-text numeric normalizer for scraped strings: currency, ranges and
/// unit suffixes become a number, anything else becomes `None`.
/// `"$1,500 - $1,800"` takes the low end of the range.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let cleaned = text
        .replace("Sq Ft", "")
        .replace("Beds", "")
        .replace("Bed", "")
        .replace("Baths", "")
        .replace("Bath", "")
        .replace('$', "")
        .replace(',', "")
        .replace('+', "")
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "-");
    let cleaned = cleaned.trim();
    let candidate = match cleaned.split_once('-') {
        Some((first, _)) => first.trim(),
        None => cleaned,
    };
    if candidate.is_empty() {
        return None;
    }
    candidate.parse::<f64>().ok()
}

/// First match's trimmed text, or `None` for zero matches / blank text.
pub fn element_text(scope: ElementRef, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    scope.select(&sel).next().and_then(text_of)
}

fn nth_text(scope: ElementRef, selector: &str, index: usize) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    scope.select(&sel).nth(index).and_then(text_of)
}

fn own_attr(el: ElementRef, attr: &str) -> Option<String> {
    el.value()
        .attr(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn text_of(el: ElementRef) -> Option<String> {
    let text = el.text().collect::<String>();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn full_text(el: ElementRef) -> String {
    el.text().collect()
}

fn join_address(parts: &[&Option<String>]) -> Option<String> {
    let present: Vec<&str> = parts.iter().filter_map(|part| part.as_deref()).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <h1 class="propertyName"> Lakeview Towers </h1>
          <div class="propertyAddressContainer">
            <div class="delivery-address"><span>500 N Lake Shore Dr</span></div>
            <h2>
              <span class="address-city">Chicago</span>
              <div class="stateZipContainer"><span>IL</span><span>60611</span></div>
            </h2>
          </div>
          <span class="reviewRating">4.5</span>
          <span class="verifedText">Verified</span>
          <div class="feesPoliciesCard">
            <h3>Lease Options</h3>
            <div class="component-list">
              <div class="column">12 months</div>
              <div class="column">6 months</div>
            </div>
          </div>
          <div class="feesPoliciesCard">
            <h3>Property Information</h3>
            <div class="component-list">
              <div class="column">Built in 2010</div>
              <div class="column">402 units</div>
            </div>
          </div>
          <ul>
            <li class="unitContainer" data-beds="2" data-baths="1.5" data-unitkey="key-101">
              <span class="modelName">Two Bed Deluxe</span>
              <span class="rentLabel">$2,400 - $2,650</span>
              <div class="sqftColumn"><span class="screenReaderOnly">Square feet</span><span>980</span></div>
              <div class="unitColumn"><span title="101">101</span></div>
              <div class="pricingColumn"><span class="screenReaderOnly">price</span><span>$2,400</span></div>
              <div class="availableColumn"><span class="dateAvailable">Oct 1</span></div>
            </li>
            <li class="unitContainer" data-beds="0" data-baths="1" data-unitkey="key-102">
              <span class="modelName">Studio</span>
              <span class="rentLabel">Call for Price</span>
              <div class="detailsTextWrapper"><span>Studio</span><span>650 Sq Ft</span></div>
              <div class="unitColumn"><span title="102">102</span></div>
              <div class="availableColumn"><span class="dateAvailable">Available Now</span></div>
            </li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn extracts_full_detail_page() {
        let record = extract_property(DETAIL_PAGE, "https://example.com/lakeview");

        assert_eq!(record.title.as_deref(), Some("Lakeview Towers"));
        assert_eq!(record.street.as_deref(), Some("500 N Lake Shore Dr"));
        assert_eq!(record.city.as_deref(), Some("Chicago"));
        assert_eq!(record.state.as_deref(), Some("IL"));
        assert_eq!(record.zip_code.as_deref(), Some("60611"));
        assert_eq!(
            record.address.as_deref(),
            Some("500 N Lake Shore Dr, Chicago, IL, 60611")
        );
        assert_eq!(record.property_reviews, Some(4.5));
        assert_eq!(record.listing_verification.as_deref(), Some("Verified"));
        assert_eq!(
            record.lease_options,
            Some(vec!["12 months".to_string(), "6 months".to_string()])
        );
        assert_eq!(record.year_built, Some(2010));
        assert_eq!(record.pricing_and_floor_plans.len(), 2);
    }

    #[test]
    fn extracts_unit_card_fields() {
        let record = extract_property(DETAIL_PAGE, "https://example.com/lakeview");
        let deluxe = &record.pricing_and_floor_plans[0];

        assert_eq!(deluxe.apartment_name.as_deref(), Some("Two Bed Deluxe"));
        assert_eq!(deluxe.rent_price_range.as_deref(), Some("$2,400 - $2,650"));
        assert_eq!(deluxe.bedrooms, Some(2));
        assert_eq!(deluxe.bathrooms, Some(1.5));
        assert_eq!(deluxe.sqft, Some(980.0));
        assert_eq!(deluxe.unit.as_deref(), Some("101"));
        assert_eq!(deluxe.base_rent, Some(2400.0));
        assert_eq!(deluxe.availability.as_deref(), Some("Oct 1"));
        assert_eq!(deluxe.details_link.as_deref(), Some("key-101"));
    }

    #[test]
    fn sqft_falls_back_to_details_block() {
        let record = extract_property(DETAIL_PAGE, "https://example.com/lakeview");
        let studio = &record.pricing_and_floor_plans[1];

        // No dedicated sqft column on this card; "650 Sq Ft" comes from the
        // details spans with the suffix stripped.
        assert_eq!(studio.sqft, Some(650.0));
        assert_eq!(studio.base_rent, None);
    }

    #[test]
    fn missing_elements_leave_fields_missing() {
        let record = extract_property("<html><body></body></html>", "https://example.com/empty");

        assert!(record.title.is_none());
        assert!(record.address.is_none());
        assert!(record.lease_options.is_none());
        assert!(record.year_built.is_none());
        assert!(record.pricing_and_floor_plans.is_empty());
    }

    #[test]
    fn address_join_skips_missing_segments() {
        let html = r#"
            <div class="propertyAddressContainer">
              <h2>
                <span class="address-city">Chicago</span>
                <div class="stateZipContainer"><span>IL</span></div>
              </h2>
            </div>
        "#;
        let record = extract_property(html, "https://example.com/partial");
        assert_eq!(record.address.as_deref(), Some("Chicago, IL"));
    }

    #[test]
    fn lease_container_present_but_empty_is_an_empty_list() {
        let html = r#"
            <div class="feesPoliciesCard">
              <h3>Lease Options</h3>
              <div class="component-list"></div>
            </div>
        "#;
        let record = extract_property(html, "https://example.com/nolease");
        assert_eq!(record.lease_options, Some(vec![]));
    }

    #[test]
    fn unit_cards_are_capped() {
        let mut html = String::from("<ul>");
        for i in 0..25 {
            html.push_str(&format!(
                r#"<li class="unitContainer" data-unitkey="k{i}"><span class="modelName">Unit {i}</span></li>"#
            ));
        }
        html.push_str("</ul>");

        let record = extract_property(&html, "https://example.com/big");
        assert_eq!(record.pricing_and_floor_plans.len(), MAX_FLOOR_PLANS);
    }

    #[test]
    fn year_built_parse_failures_are_tolerated() {
        assert_eq!(parse_year_built("Built in 2010"), Some(2010));
        assert_eq!(parse_year_built("Built in 1998 remodeled"), Some(1998));
        assert_eq!(parse_year_built("Built in unknown"), None);
        assert_eq!(parse_year_built("renovated recently"), None);
    }

    #[test]
    fn numeric_normalizer_handles_scraped_shapes() {
        assert_eq!(parse_numeric("$1,500 - $1,800"), Some(1500.0));
        assert_eq!(parse_numeric("2 Bed"), Some(2.0));
        assert_eq!(parse_numeric("Call for Price"), None);
        assert_eq!(parse_numeric("650 Sq Ft"), Some(650.0));
        assert_eq!(parse_numeric("1.5 Baths"), Some(1.5));
        assert_eq!(parse_numeric("$2,400+"), Some(2400.0));
        assert_eq!(parse_numeric("1,100\u{2013}1,300"), Some(1100.0));
        assert_eq!(parse_numeric(""), None);
    }
}

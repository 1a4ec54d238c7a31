use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::scrapers::traits::DocumentHandle;

/// Marker for the per-listing links on an index page.
const LINK_SELECTOR: &str = "a.property-link";
/// The "next page" control.
const NEXT_SELECTOR: &str = "a.next";
/// How long to wait for the link list before concluding a page has no more
/// content.
const LINK_WAIT: Duration = Duration::from_secs(30);

/// Walk the paginated catalog from `entry_url`, accumulating detail-page
/// URLs. Duplicates across pages merge silently; relative hrefs resolve
/// against the page they appeared on. Any unexpected error ends discovery
/// early but keeps what was already accumulated.
pub async fn discover(doc: &dyn DocumentHandle, entry_url: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    if let Err(e) = doc.navigate(entry_url).await {
        warn!(url = entry_url, error = %e, "could not open catalog entry page");
        return urls;
    }

    let mut page_number = 1u32;
    loop {
        match doc.wait_for(LINK_SELECTOR, LINK_WAIT).await {
            Ok(true) => {}
            Ok(false) => {
                info!(page = page_number, "no property links appeared, ending pagination");
                break;
            }
            Err(e) => {
                warn!(page = page_number, error = %e, "error while waiting for link list");
                break;
            }
        }

        let html = match doc.content().await {
            Ok(html) => html,
            Err(e) => {
                warn!(page = page_number, error = %e, "could not read index page");
                break;
            }
        };
        let base = doc.current_url().await;

        let before = urls.len();
        collect_links(&html, &base, &mut urls, &mut seen);
        info!(
            page = page_number,
            found = urls.len() - before,
            total = urls.len(),
            "collected property links"
        );

        if !next_control_active(&html) {
            info!(page = page_number, "no more pages found, ending pagination");
            break;
        }

        if let Err(e) = doc.click(NEXT_SELECTOR).await {
            warn!(page = page_number, error = %e, "could not activate next-page control");
            break;
        }
        page_number += 1;
    }

    info!(total = urls.len(), "discovery complete");
    urls
}

fn collect_links(html: &str, base: &str, urls: &mut Vec<String>, seen: &mut HashSet<String>) {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse(LINK_SELECTOR).unwrap();
    for link in doc.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve(base, href) else {
            warn!(href, "dropping unresolvable link");
            continue;
        };
        if seen.insert(absolute.clone()) {
            urls.push(absolute);
        }
    }
}

fn resolve(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(Into::into)
}

/// An absent, hidden or disabled next control means the catalog is
/// exhausted. Computed visibility is not observable from a snapshot, so
/// "hidden" covers the attribute/class/inline-style states this catalog
/// actually uses.
fn next_control_active(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let next_sel = Selector::parse(NEXT_SELECTOR).unwrap();
    let Some(control) = doc.select(&next_sel).next() else {
        return false;
    };

    let value = control.value();
    if value.attr("disabled").is_some() || value.attr("hidden").is_some() {
        return false;
    }
    if value.attr("aria-disabled") == Some("true") {
        return false;
    }
    if value
        .attr("class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == "disabled"))
    {
        return false;
    }
    if value
        .attr("style")
        .is_some_and(|style| style.replace(' ', "").contains("display:none"))
    {
        return false;
    }
    true
}

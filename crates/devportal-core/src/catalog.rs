//! API catalog search.

use crate::model::ApiProduct;

/// Products whose name contains `term`, ignoring case. A blank term matches
/// everything.
pub fn filter_products<'a>(products: &'a [ApiProduct], term: &str) -> Vec<&'a ApiProduct> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return products.iter().collect();
    }
    products
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .collect()
}

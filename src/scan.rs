//! Classification of decoded scanner input.
//!
//! The scanner itself (camera, detector selection) is an external
//! collaborator; this module only interprets the decoded strings it emits.

use uuid::Uuid;

use crate::models::Article;

const LOCATION_PREFIX: &str = "LOC:";
const CATEGORY_SEPARATOR: &str = "::";

/// A classified scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCode {
    /// A shelf/location code. `category` is `None` for the legacy bare form
    /// `LOC:<name>`, which may be ambiguous across categories.
    Location {
        category: Option<String>,
        name: String,
    },
    /// A raw identifier to match against article id / EAN / SKU /
    /// supplier-SKU, in that precedence order.
    Identifier(String),
}

pub fn classify(input: &str) -> ScanCode {
    let input = input.trim();
    match input.strip_prefix(LOCATION_PREFIX) {
        Some(rest) => match rest.split_once(CATEGORY_SEPARATOR) {
            Some((category, name)) => ScanCode::Location {
                category: Some(category.to_string()),
                name: name.to_string(),
            },
            None => ScanCode::Location {
                category: None,
                name: rest.to_string(),
            },
        },
        None => ScanCode::Identifier(input.to_string()),
    }
}

/// Resolves a raw identifier against the article list: id first, then EAN,
/// then SKU, then supplier SKU.
pub fn resolve_article<'a>(articles: &'a [Article], code: &str) -> Option<&'a Article> {
    if let Ok(id) = Uuid::parse_str(code) {
        if let Some(article) = articles.iter().find(|a| a.id == id) {
            return Some(article);
        }
    }
    articles
        .iter()
        .find(|a| a.ean.as_deref() == Some(code))
        .or_else(|| articles.iter().find(|a| a.sku.as_deref() == Some(code)))
        .or_else(|| articles.iter().find(|a| a.supplier_sku.as_deref() == Some(code)))
}

/// Resolves a location scan to the articles stored there.
///
/// Without a category, the legacy bare form matches the location name across
/// every category; more than one result means the caller should prompt for
/// disambiguation.
pub fn resolve_location<'a>(
    articles: &'a [Article],
    category: Option<&str>,
    name: &str,
) -> Vec<&'a Article> {
    articles
        .iter()
        .filter(|article| {
            let Some(location) = article.location.as_deref() else {
                return false;
            };
            match location.split_once(CATEGORY_SEPARATOR) {
                Some((cat, loc)) => {
                    loc == name && category.map(|wanted| wanted == cat).unwrap_or(true)
                }
                None => category.is_none() && location == name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(name: &str, ean: Option<&str>, sku: Option<&str>, location: Option<&str>) -> Article {
        Article {
            id: Uuid::new_v4(),
            warehouse_id: Uuid::nil(),
            name: name.to_string(),
            ean: ean.map(String::from),
            sku: sku.map(String::from),
            supplier_sku: None,
            stock: 0,
            location: location.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn classifies_location_and_identifier_scans() {
        assert_eq!(
            classify("LOC:tools::A3"),
            ScanCode::Location {
                category: Some("tools".to_string()),
                name: "A3".to_string()
            }
        );
        assert_eq!(
            classify("LOC:A3"),
            ScanCode::Location {
                category: None,
                name: "A3".to_string()
            }
        );
        assert_eq!(
            classify("4006381333931"),
            ScanCode::Identifier("4006381333931".to_string())
        );
    }

    #[test]
    fn identifier_resolution_prefers_id_over_ean_over_sku() {
        let by_ean = article("hammer", Some("4006381333931"), Some("HAM-1"), None);
        let by_sku = article("chisel", None, Some("4006381333931"), None);
        let articles = vec![by_sku, by_ean.clone()];

        let hit = resolve_article(&articles, "4006381333931").unwrap();
        assert_eq!(hit.name, by_ean.name, "EAN match outranks SKU match");

        let by_id = resolve_article(&articles, &articles[0].id.to_string()).unwrap();
        assert_eq!(by_id.name, "chisel");
    }

    #[test]
    fn bare_location_matches_across_categories() {
        let a = article("bolts", None, None, Some("hardware::A3"));
        let b = article("drills", None, None, Some("tools::A3"));
        let c = article("paint", None, None, Some("tools::B1"));
        let articles = vec![a, b, c];

        let ambiguous = resolve_location(&articles, None, "A3");
        assert_eq!(ambiguous.len(), 2);

        let narrowed = resolve_location(&articles, Some("tools"), "A3");
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].name, "drills");
    }
}

//! GBFS feed-discovery documents.
//!
//! Publishers disagree on where the feed list lives: GBFS 1.x nests it under
//! a language code, 2.x+ puts it directly under `data`. Rather than branch
//! through the document ad hoc, the known locations form an ordered strategy
//! list and the first one holding a non-empty list wins.

use serde::Deserialize;
use serde_json::Value;

use super::FeedError;

/// One entry of the discovery document's feed list.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRef {
    pub name: String,
    pub url: String,
}

/// Feed-list locations, probed in order.
const FEED_LIST_PATHS: [&[&str]; 3] = [
    &["data", "en", "feeds"],
    &["data", "feeds"],
    &["data", "de", "feeds"],
];

/// Extracts the sub-feed list from a discovery document.
///
/// Entries that do not carry both `name` and `url` are dropped, matching how
/// publishers pad the list with extension entries.
pub fn locate_feeds(discovery: &Value) -> Result<Vec<FeedRef>, FeedError> {
    for path in FEED_LIST_PATHS {
        let Some(list) = lookup(discovery, path).and_then(Value::as_array) else {
            continue;
        };

        let feeds: Vec<FeedRef> = list
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect();

        if !feeds.is_empty() {
            return Ok(feeds);
        }
    }

    Err(FeedError::MissingFeedList)
}

/// Returns the URL of the feed named `name`, or `MissingRequiredFeed`.
pub fn required_feed<'a>(feeds: &'a [FeedRef], name: &'static str) -> Result<&'a str, FeedError> {
    feeds
        .iter()
        .find(|feed| feed.name == name)
        .map(|feed| feed.url.as_str())
        .ok_or(FeedError::MissingRequiredFeed(name))
}

fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |node, key| node.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_list() -> Value {
        json!([
            {"name": "station_information", "url": "https://example.org/info.json"},
            {"name": "station_status", "url": "https://example.org/status.json"}
        ])
    }

    #[test]
    fn test_locates_language_keyed_list() {
        let doc = json!({"data": {"en": {"feeds": feed_list()}}});
        let feeds = locate_feeds(&doc).unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "station_information");
    }

    #[test]
    fn test_locates_flat_list() {
        let doc = json!({"data": {"feeds": feed_list()}});
        assert_eq!(locate_feeds(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_locates_german_list() {
        let doc = json!({"data": {"de": {"feeds": feed_list()}}});
        assert_eq!(locate_feeds(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_first_non_empty_list_wins() {
        // An empty `en` block must not shadow a populated flat list.
        let doc = json!({"data": {"en": {"feeds": []}, "feeds": feed_list()}});
        assert_eq!(locate_feeds(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_feed_list() {
        let doc = json!({"data": {"fr": {"feeds": feed_list()}}});
        assert!(matches!(locate_feeds(&doc), Err(FeedError::MissingFeedList)));

        let doc = json!({"last_updated": 1_700_000_000});
        assert!(matches!(locate_feeds(&doc), Err(FeedError::MissingFeedList)));
    }

    #[test]
    fn test_required_feed_lookup() {
        let doc = json!({"data": {"en": {"feeds": feed_list()}}});
        let feeds = locate_feeds(&doc).unwrap();

        assert_eq!(
            required_feed(&feeds, "station_status").unwrap(),
            "https://example.org/status.json"
        );
        assert!(matches!(
            required_feed(&feeds, "free_bike_status"),
            Err(FeedError::MissingRequiredFeed("free_bike_status"))
        ));
    }
}
